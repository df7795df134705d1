use std::fmt;
use std::future::Future;

use anyhow::Context;
use reqwest::header::{ACCEPT, ETAG, IF_NONE_MATCH, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{
    HttpError, Throttled, Upstream, UpstreamError, UpstreamRequest, UpstreamResponse, classify,
};
use crate::caching::Validator;
use crate::config::GitHubConfig;

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

#[derive(Clone)]
enum Credentials {
    Anonymous,
    Token(String),
    OAuthApp { client_id: String, secret: String },
}

impl Credentials {
    fn from_config(config: &GitHubConfig) -> Self {
        match (&config.token, &config.client_id, &config.client_secret) {
            (Some(token), _, _) => Self::Token(token.clone()),
            (None, Some(client_id), Some(secret)) => Self::OAuthApp {
                client_id: client_id.clone(),
                secret: secret.clone(),
            },
            _ => Self::Anonymous,
        }
    }

    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Anonymous => builder,
            Self::Token(token) => builder.bearer_auth(token),
            Self::OAuthApp { client_id, secret } => builder.basic_auth(client_id, Some(secret)),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Token(_) => f.write_str("Token(..)"),
            Self::OAuthApp { client_id, .. } => f
                .debug_struct("OAuthApp")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// The GitHub REST API.
#[derive(Clone, Debug)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: Url,
    user_agent: String,
    credentials: Credentials,
}

impl GitHubClient {
    pub fn new(client: reqwest::Client, config: &GitHubConfig) -> Self {
        if config.token.is_none() && config.client_id.is_none() {
            tracing::warn!("no GitHub credentials configured, requests are made anonymously");
        }

        Self {
            client,
            api_url: config.api_url.clone(),
            user_agent: config.user_agent.clone(),
            credentials: Credentials::from_config(config),
        }
    }

    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = request.url(&self.api_url)?;
        tracing::trace!("Fetching {}", url);

        let mut builder = self
            .client
            .request(request.method().clone(), url)
            .header(ACCEPT, GITHUB_MEDIA_TYPE)
            .header(USER_AGENT, &self.user_agent);
        builder = self.credentials.apply(builder);
        if let Some(validator) = request.validator() {
            builder = builder.header(IF_NONE_MATCH, validator.header_value());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("failed to send request `{request}`"))?;

        let status = response.status();
        if status.is_success() {
            let validator = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(Validator::from_etag);
            let payload = if status == StatusCode::NO_CONTENT {
                Value::Null
            } else {
                response
                    .json::<Value>()
                    .await
                    .with_context(|| format!("invalid response body for `{request}`"))?
            };

            return Ok(UpstreamResponse { validator, payload });
        }

        if status == StatusCode::NOT_MODIFIED {
            return Err(HttpError::new(status, "Not Modified").into());
        }

        Err(error_from_response(response).await)
    }
}

/// Turns a non-success response into either a rate limit or a plain HTTP error.
async fn error_from_response(response: Response) -> UpstreamError {
    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .ok()
        .filter(|message| !message.is_empty())
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_else(|| status.to_string());

    match classify(status, &headers, &message, chrono::Utc::now()) {
        Some((kind, retry_after)) => Throttled {
            kind,
            retry_after,
            status,
            message,
        }
        .into(),
        None => HttpError::new(status, message).into(),
    }
}

impl Upstream for GitHubClient {
    fn call(
        &self,
        request: &UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send {
        self.execute(request)
    }
}
