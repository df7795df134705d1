//! Calls to the upstream API.
//!
//! An [`Upstream`] turns an [`UpstreamRequest`] into an [`UpstreamResponse`] or one of the
//! [`UpstreamError`] shapes. [`GitHubClient`] talks HTTP to GitHub, [`RetryingUpstream`] wraps
//! any other upstream with the rate-limit policy.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::caching::Validator;

mod github;
mod rate_limit;
mod retry;
#[cfg(test)]
pub(crate) mod testing;

pub use github::GitHubClient;
pub use rate_limit::{RateLimitKind, RateLimitSignal, classify};
pub use retry::{RetryDecision, RetryingUpstream, decide};

/// A request to the upstream API, described by a URL template and its parameters.
///
/// Templates use `{name}` placeholders which each cover one or more whole path segments, e.g.
/// `/repos/{owner}/{repo}/contents/{path}`.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamRequest {
    method: Method,
    template: &'static str,
    params: BTreeMap<String, String>,
    body: Option<Value>,
    validator: Option<Validator>,
}

impl UpstreamRequest {
    pub fn new(method: Method, template: &'static str) -> Self {
        Self {
            method,
            template,
            params: BTreeMap::new(),
            body: None,
            validator: None,
        }
    }

    pub fn get(template: &'static str) -> Self {
        Self::new(Method::GET, template)
    }

    pub fn post(template: &'static str) -> Self {
        Self::new(Method::POST, template)
    }

    /// Sets the value of the `{name}` placeholder.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets a JSON request body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Makes the request conditional on `validator`.
    pub fn set_validator(&mut self, validator: Option<Validator>) {
        self.validator = validator;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Resolves the template against `base`.
    ///
    /// Parameter values are split on `/` and every segment is percent encoded on its own. Empty
    /// and `.` segments are skipped, a parameter without any segment leaves a trailing slash.
    pub fn url(&self, base: &Url) -> Result<Url, UpstreamError> {
        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("`{base}` cannot be a base url"))?;
            segments.pop_if_empty();

            for part in self.template.split('/').filter(|part| !part.is_empty()) {
                let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) else {
                    segments.push(part);
                    continue;
                };

                let value = self.params.get(name).ok_or_else(|| {
                    anyhow::anyhow!("missing parameter `{name}` for `{}`", self.template)
                })?;

                let mut pushed = false;
                for segment in value.split('/').filter(|s| !s.is_empty() && *s != ".") {
                    segments.push(segment);
                    pushed = true;
                }
                if !pushed {
                    segments.push("");
                }
            }
        }

        Ok(url)
    }
}

impl fmt::Display for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

/// A successful upstream response.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamResponse {
    /// The validator of the returned representation, if the upstream sent one.
    pub validator: Option<Validator>,
    /// The decoded response body.
    pub payload: Value,
}

/// A non-success HTTP response that is not a rate limit.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether this is the answer to a conditional request whose validator still matches.
    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED
    }
}

/// The upstream refused a request because of one of its rate limits.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct Throttled {
    pub kind: RateLimitKind,
    /// How long the upstream asks us to wait before trying again.
    pub retry_after: Duration,
    pub status: StatusCode,
    pub message: String,
}

impl Throttled {
    /// The signal for the `attempt`-th (0-based) attempt of a call.
    pub fn signal(&self, attempt: u32) -> RateLimitSignal {
        RateLimitSignal {
            kind: self.kind,
            retry_after: self.retry_after,
            attempt,
        }
    }
}

/// The ways a call to the upstream can fail.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// A structured HTTP failure, including "not modified".
    #[error(transparent)]
    Http(#[from] HttpError),
    /// A primary or secondary rate limit.
    #[error(transparent)]
    RateLimited(#[from] Throttled),
    /// Anything else: transport failures, undecodable bodies, bugs.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Something that can execute [`UpstreamRequest`]s.
pub trait Upstream: Send + Sync {
    fn call(
        &self,
        request: &UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send;
}

impl<U: Upstream> Upstream for Arc<U> {
    fn call(
        &self,
        request: &UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send {
        (**self).call(request)
    }
}
