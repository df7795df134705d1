//! The GitHub service and a way to create it from the [`Config`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use thiserror::Error;

use crate::caching::{CacheStore, CacheUsage, entry_weigher};
use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{ConditionalFetcher, Payload};
use crate::issues::{BugReport, IssueError};
use crate::notify::create_notifier;
use crate::upstream::{GitHubClient, RetryingUpstream, Upstream, UpstreamRequest};
use crate::utils::http::{HttpTimeouts, create_client};

const CONTENTS: &str = "/repos/{owner}/{repo}/contents/{path}";
const RATE_LIMIT: &str = "/rate_limit";
const ISSUES: &str = "/repos/{owner}/{repo}/issues";

/// The path listed when a contents request does not name one.
const ROOT_PATH: &str = ".";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("`{0}` is not a repository of the form `owner/repo`")]
    InvalidSlug(String),
    #[error("issue reports are not enabled")]
    IssuesDisabled,
    #[error(transparent)]
    InvalidReport(#[from] IssueError),
    #[error("unexpected response from upstream: missing `{0}`")]
    MalformedResponse(&'static str),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A repository, identified by its owner and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl FromStr for RepoSlug {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim_matches('/').split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self {
                    owner: owner.to_owned(),
                    repo: repo.to_owned(),
                })
            }
            _ => Err(ServiceError::InvalidSlug(s.to_owned())),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// The logical identity of a contents listing, independent of validators and credentials.
pub fn contents_key(slug: &RepoSlug, path: &str) -> String {
    format!("getContent${slug}${path}")
}

/// Repository contents, rate limit status and issue creation on top of the caching layer.
#[derive(Debug)]
pub struct GitHubService<U = RetryingUpstream<GitHubClient>> {
    fetcher: ConditionalFetcher<U>,
    issues_repository: Option<RepoSlug>,
}

/// Creates the [`GitHubService`] according to the provided [`Config`].
pub fn create_service(config: &Config) -> Result<GitHubService> {
    let client = create_client(&HttpTimeouts::from_config(&config.github))?;
    let notifier = create_notifier(&config.notifications, client.clone());
    let upstream = RetryingUpstream::new(GitHubClient::new(client, &config.github), notifier);

    let issues_repository = config
        .issues
        .repository
        .as_deref()
        .map(RepoSlug::from_str)
        .transpose()
        .context("invalid issues repository")?;

    Ok(GitHubService::new(
        config.cache.max_size_bytes,
        upstream,
        issues_repository,
    ))
}

impl<U: Upstream> GitHubService<U> {
    pub fn new(cache_size: u64, upstream: U, issues_repository: Option<RepoSlug>) -> Self {
        let cache = Arc::new(CacheStore::new(cache_size, entry_weigher()));
        Self {
            fetcher: ConditionalFetcher::new(cache, upstream),
            issues_repository,
        }
    }

    /// Lists a directory or fetches a file of a repository, going through the cache.
    ///
    /// A missing or empty `path` lists the root of the repository.
    pub async fn repository_contents(
        &self,
        slug: &str,
        path: Option<&str>,
    ) -> Result<Payload, ServiceError> {
        let slug: RepoSlug = slug.parse()?;
        let path = path.filter(|path| !path.is_empty()).unwrap_or(ROOT_PATH);

        let request = UpstreamRequest::get(CONTENTS)
            .param("owner", &slug.owner)
            .param("repo", &slug.repo)
            .param("path", path);

        Ok(self.fetcher.fetch(&contents_key(&slug, path), request).await?)
    }

    /// The current state of the core API quota. Never cached.
    pub async fn rate_limit(&self) -> Result<Value, ServiceError> {
        let response = self
            .fetcher
            .fetch_uncached(&UpstreamRequest::get(RATE_LIMIT))
            .await?;

        response
            .pointer("/resources/core")
            .cloned()
            .ok_or(ServiceError::MalformedResponse("resources.core"))
    }

    /// Files `report` as an issue and returns the issue's URL.
    pub async fn create_issue(&self, report: &BugReport) -> Result<String, ServiceError> {
        let repository = self
            .issues_repository
            .as_ref()
            .ok_or(ServiceError::IssuesDisabled)?;
        report.validate()?;

        let request = UpstreamRequest::post(ISSUES)
            .param("owner", &repository.owner)
            .param("repo", &repository.repo)
            .json(json!({
                "title": report.title,
                "body": report.to_markdown_body(),
            }));

        let response = self.fetcher.fetch_uncached(&request).await?;
        let url = response
            .get("html_url")
            .and_then(Value::as_str)
            .ok_or(ServiceError::MalformedResponse("html_url"))?;

        tracing::info!(%repository, mode = %report.mode, url, "created issue");
        Ok(url.to_owned())
    }

    pub fn cache_usage(&self) -> CacheUsage {
        self.fetcher.usage()
    }

    pub fn upstream(&self) -> &U {
        self.fetcher.upstream()
    }
}
