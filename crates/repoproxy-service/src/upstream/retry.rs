use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sentry::{Hub, SentryFutureExt};

use super::{
    RateLimitKind, RateLimitSignal, Throttled, Upstream, UpstreamError, UpstreamRequest,
    UpstreamResponse,
};
use crate::notify::{Notice, Notifier, Severity};

/// What to do after a rate limited attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the given delay, then attempt the call once more.
    Retry(Duration),
    /// Fail the call with the rate limit error.
    GiveUp,
}

/// The retry policy.
///
/// Only the first attempt of a call is retried, and only when it ran into the primary quota. The
/// secondary limit is never retried, retrying would only prolong the penalty.
pub fn decide(signal: &RateLimitSignal) -> RetryDecision {
    match signal.kind {
        RateLimitKind::PrimaryQuotaExhausted if signal.attempt == 0 => {
            RetryDecision::Retry(signal.retry_after)
        }
        _ => RetryDecision::GiveUp,
    }
}

enum CallState {
    Attempting(u32),
    Backoff { attempt: u32, delay: Duration },
}

/// An [`Upstream`] that cooperates with the rate limits of the wrapped upstream.
///
/// Every rate limit is reported to a [`Notifier`]. Delivery happens in the background and never
/// delays or alters the outcome of the call.
#[derive(Clone)]
pub struct RetryingUpstream<U> {
    upstream: U,
    notifier: Arc<dyn Notifier>,
}

impl<U> std::fmt::Debug for RetryingUpstream<U>
where
    U: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingUpstream")
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl<U: Upstream> RetryingUpstream<U> {
    pub fn new(upstream: U, notifier: Arc<dyn Notifier>) -> Self {
        Self { upstream, notifier }
    }

    pub fn inner(&self) -> &U {
        &self.upstream
    }

    fn report(
        &self,
        request: &UpstreamRequest,
        throttled: &Throttled,
        signal: RateLimitSignal,
        decision: RetryDecision,
    ) {
        let retry_after = signal.retry_after.as_secs();
        let (severity, title) = match signal.kind {
            RateLimitKind::PrimaryQuotaExhausted => {
                metric!(counter("upstream.rate_limited") += 1);
                tracing::warn!(
                    %request,
                    attempt = signal.attempt,
                    retry_after,
                    "upstream rate limit hit"
                );
                (Severity::Warning, "Rate limit hit")
            }
            RateLimitKind::SecondaryAbuseDetected => {
                metric!(counter("upstream.abuse_detected") += 1);
                tracing::error!(
                    %request,
                    attempt = signal.attempt,
                    retry_after,
                    "upstream abuse detection triggered"
                );
                (Severity::Error, "Abuse detection triggered")
            }
        };

        let description = match decision {
            RetryDecision::Retry(delay) => {
                format!("Retrying after {}s: {}", delay.as_secs(), throttled.message)
            }
            RetryDecision::GiveUp => format!("Giving up: {}", throttled.message),
        };

        let mut notice = Notice::new(severity, title, description)
            .detail("method", request.method())
            .detail("url", request.template())
            .detail("attempt", signal.attempt)
            .detail("retry_after", format!("{retry_after}s"));
        for (name, value) in request.params() {
            notice = notice.detail(name.as_str(), value);
        }

        let delivery = self.notifier.notify(notice);
        let future = async move {
            if let Err(err) = delivery.await {
                tracing::warn!(error = &err as &dyn std::error::Error, "failed to send notification");
            }
        };
        tokio::spawn(future.bind_hub(Hub::new_from_top(Hub::current())));
    }
}

impl<U: Upstream> Upstream for RetryingUpstream<U> {
    fn call(
        &self,
        request: &UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send {
        async move {
            let mut state = CallState::Attempting(0);
            loop {
                state = match state {
                    CallState::Attempting(attempt) => match self.upstream.call(request).await {
                        Err(UpstreamError::RateLimited(throttled)) => {
                            let signal = throttled.signal(attempt);
                            let decision = decide(&signal);
                            self.report(request, &throttled, signal, decision);

                            match decision {
                                RetryDecision::Retry(delay) => CallState::Backoff { attempt, delay },
                                RetryDecision::GiveUp => return Err(throttled.into()),
                            }
                        }
                        result => return result,
                    },
                    CallState::Backoff { attempt, delay } => {
                        metric!(counter("upstream.retry") += 1);
                        tracing::info!(%request, delay = ?delay, "retrying rate limited request");
                        tokio::time::sleep(delay).await;
                        CallState::Attempting(attempt + 1)
                    }
                };
            }
        }
    }
}
