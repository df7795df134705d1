//! The errors surfaced by the caching layer.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::upstream::{RateLimitKind, Throttled, UpstreamError};

/// A failed fetch, translated from an [`UpstreamError`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream answered with a non-success status, including not found.
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    /// The primary rate limit is still exhausted after the retry.
    #[error("{message}")]
    RateLimited {
        retry_after: Duration,
        message: String,
    },
    /// The upstream flagged our requests as abusive.
    #[error("{message}")]
    AbuseDetected {
        retry_after: Duration,
        message: String,
    },
    /// The upstream claimed an entry was not modified, but it is not cached.
    ///
    /// This is an internal consistency failure, the entry's validator was only sent because it
    /// was cached a moment ago.
    #[error("upstream reported `{key}` as not modified, but it is not cached")]
    MissingCacheEntry { key: String },
    /// Any other failure, exactly as the upstream client produced it.
    #[error(transparent)]
    Unknown(anyhow::Error),
}

impl FetchError {
    /// The HTTP status this error should be reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AbuseDetected { .. } => StatusCode::FORBIDDEN,
            Self::MissingCacheEntry { .. } | Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// How long the caller should wait before trying again, for rate limits.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::AbuseDetected { retry_after, .. } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

impl From<UpstreamError> for FetchError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Http(err) => Self::Http {
                status: err.status,
                message: err.message,
            },
            UpstreamError::RateLimited(Throttled {
                kind,
                retry_after,
                message,
                ..
            }) => match kind {
                RateLimitKind::PrimaryQuotaExhausted => Self::RateLimited {
                    retry_after,
                    message,
                },
                RateLimitKind::SecondaryAbuseDetected => Self::AbuseDetected {
                    retry_after,
                    message,
                },
            },
            UpstreamError::Other(err) => Self::Unknown(err),
        }
    }
}
