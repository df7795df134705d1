//! Recognizing GitHub's rate limit responses.
//!
//! GitHub answers with `403` or `429` both for the primary (hourly quota) and the secondary
//! (abuse detection) rate limit. They are told apart by the `x-ratelimit-remaining` header and
//! the error message.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;

/// The delay used when the upstream does not suggest one.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Which of the upstream's limits was hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    /// The request quota of the current window is used up.
    PrimaryQuotaExhausted,
    /// The upstream considers the request pattern abusive.
    SecondaryAbuseDetected,
}

impl RateLimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryQuotaExhausted => "primary",
            Self::SecondaryAbuseDetected => "secondary",
        }
    }
}

impl fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate limit hit by one attempt of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub kind: RateLimitKind,
    /// The delay the upstream suggested before trying again.
    pub retry_after: Duration,
    /// The 0-based attempt of the call that was rate limited.
    pub attempt: u32,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    header(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// The longest wait derived from `x-ratelimit-reset`. The primary quota resets hourly.
const MAX_RESET_WAIT: Duration = Duration::from_secs(60 * 60 + 1);

/// Seconds until `x-ratelimit-reset`, plus one second of slack.
///
/// A reset in the past means no wait at all. A reset further away than [`MAX_RESET_WAIT`] is
/// ignored.
fn until_reset(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let reset = header(headers, "x-ratelimit-reset")?.parse::<i64>().ok()?;
    let secs = reset.saturating_sub(now.timestamp()).saturating_add(1);
    let wait = Duration::from_secs(u64::try_from(secs).unwrap_or(0));
    (wait <= MAX_RESET_WAIT).then_some(wait)
}

/// Classifies an error response as one of the rate limits.
///
/// Returns `None` for responses that are not caused by a rate limit, most notably a `403` that
/// simply denies access.
pub fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    message: &str,
    now: DateTime<Utc>,
) -> Option<(RateLimitKind, Duration)> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let message = message.to_lowercase();
    if message.contains("secondary rate limit") || message.contains("abuse") {
        let retry_after = retry_after_header(headers).unwrap_or(DEFAULT_RETRY_AFTER);
        return Some((RateLimitKind::SecondaryAbuseDetected, retry_after));
    }

    if header(headers, "x-ratelimit-remaining") == Some("0") {
        let retry_after = until_reset(headers, now)
            .or_else(|| retry_after_header(headers))
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Some((RateLimitKind::PrimaryQuotaExhausted, retry_after));
    }

    if let Some(retry_after) = retry_after_header(headers) {
        return Some((RateLimitKind::SecondaryAbuseDetected, retry_after));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some((RateLimitKind::PrimaryQuotaExhausted, DEFAULT_RETRY_AFTER));
    }

    None
}
