use std::sync::Arc;

use serde_json::Value;

use crate::caching::{CacheStore, CacheUsage};
use crate::error::FetchError;
use crate::upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Payloads are shared between the cache and all requests that read them.
pub type Payload = Arc<Value>;

/// Fetches through the cache, revalidating known entries with `If-None-Match`.
///
/// A "not modified" answer is served from the cache. New content replaces the cached entry, but
/// only when the upstream sent a validator along with it.
///
/// Concurrent fetches of the same key are not coalesced. They all go upstream and the last one
/// to finish decides the cached entry.
#[derive(Debug)]
pub struct ConditionalFetcher<U> {
    cache: Arc<CacheStore<Payload>>,
    upstream: U,
}

impl<U: Upstream> ConditionalFetcher<U> {
    pub fn new(cache: Arc<CacheStore<Payload>>, upstream: U) -> Self {
        Self { cache, upstream }
    }

    /// Executes `request` on behalf of the logical `key`.
    pub async fn fetch(&self, key: &str, mut request: UpstreamRequest) -> Result<Payload, FetchError> {
        let cached = self.cache.get(key);
        request.set_validator(cached.as_ref().map(|entry| entry.validator.clone()));

        match self.upstream.call(&request).await {
            Ok(UpstreamResponse { validator, payload }) => {
                if cached.is_some() {
                    metric!(counter("cache.revalidated") += 1);
                } else {
                    metric!(counter("cache.miss") += 1);
                }

                let payload = Arc::new(payload);
                match validator {
                    Some(validator) => {
                        self.cache.put(key, validator, Arc::clone(&payload));
                    }
                    None => tracing::debug!(key, "not caching response without validator"),
                }
                Ok(payload)
            }
            Err(UpstreamError::Http(err)) if err.is_not_modified() => match cached {
                Some(entry) => {
                    metric!(counter("cache.hit") += 1);
                    Ok(entry.payload)
                }
                None => {
                    let err = FetchError::MissingCacheEntry { key: key.to_owned() };
                    tracing::error!(error = &err as &dyn std::error::Error, "inconsistent cache");
                    Err(err)
                }
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Executes `request` bypassing the cache entirely.
    pub async fn fetch_uncached(&self, request: &UpstreamRequest) -> Result<Payload, FetchError> {
        let response = self.upstream.call(request).await?;
        Ok(Arc::new(response.payload))
    }

    pub fn usage(&self) -> CacheUsage {
        self.cache.usage()
    }

    pub fn cache(&self) -> &CacheStore<Payload> {
        &self.cache
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::caching::{ByteCounts, Validator, entry_weigher};
    use crate::upstream::testing::{ScriptedUpstream, ok};
    use crate::upstream::{HttpError, RateLimitKind, RetryingUpstream};

    const KEY: &str = "getContent$gobstones/demo$.";

    fn request() -> UpstreamRequest {
        UpstreamRequest::get("/repos/{owner}/{repo}/contents/{path}")
            .param("owner", "gobstones")
            .param("repo", "demo")
            .param("path", ".")
    }

    fn not_modified() -> Result<UpstreamResponse, UpstreamError> {
        Err(HttpError::new(StatusCode::NOT_MODIFIED, "Not Modified").into())
    }

    fn fetcher(
        limit: u64,
        script: impl IntoIterator<Item = Result<UpstreamResponse, UpstreamError>>,
    ) -> ConditionalFetcher<Arc<ScriptedUpstream>> {
        let cache = Arc::new(CacheStore::new(limit, entry_weigher()));
        ConditionalFetcher::new(cache, Arc::new(ScriptedUpstream::new(script)))
    }

    fn sent_validators(fetcher: &ConditionalFetcher<Arc<ScriptedUpstream>>) -> Vec<Option<String>> {
        fetcher
            .upstream()
            .requests()
            .iter()
            .map(|request| request.validator().map(Validator::header_value))
            .collect()
    }

    #[tokio::test]
    async fn test_worked_example() {
        let listing = json!([{"name": "file.txt"}]);
        let fetcher = fetcher(5000, [ok(Some("W/\"1234\""), listing.clone()), not_modified()]);

        let first = fetcher.fetch(KEY, request()).await.unwrap();
        assert_eq!(*first, listing);
        assert_eq!(
            fetcher.usage().raw,
            ByteCounts {
                limit: 5000,
                used: 48,
                remaining: 4952,
            }
        );

        let second = fetcher.fetch(KEY, request()).await.unwrap();
        assert_eq!(*second, listing);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.usage().raw.used, 48);
    }

    #[tokio::test]
    async fn test_attaches_stored_validator() {
        let fetcher = fetcher(
            5000,
            [ok(Some("W/\"1234\""), json!([])), not_modified()],
        );

        fetcher.fetch(KEY, request()).await.unwrap();
        fetcher.fetch(KEY, request()).await.unwrap();

        assert_eq!(
            sent_validators(&fetcher),
            [None, Some("\"1234\"".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_replacement_on_change() {
        let fetcher = fetcher(
            5000,
            [
                ok(Some("W/\"1\""), json!(["old"])),
                ok(Some("W/\"2\""), json!(["new"])),
                not_modified(),
            ],
        );

        assert_eq!(*fetcher.fetch(KEY, request()).await.unwrap(), json!(["old"]));
        assert_eq!(*fetcher.fetch(KEY, request()).await.unwrap(), json!(["new"]));
        assert_eq!(*fetcher.fetch(KEY, request()).await.unwrap(), json!(["new"]));

        assert_eq!(
            sent_validators(&fetcher),
            [None, Some("\"1\"".to_owned()), Some("\"2\"".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_response_without_validator_is_not_cached() {
        let fetcher = fetcher(
            5000,
            [ok(Some("W/\"1\""), json!(["old"])), ok(None, json!(["new"]))],
        );

        fetcher.fetch(KEY, request()).await.unwrap();
        let fresh = fetcher.fetch(KEY, request()).await.unwrap();
        assert_eq!(*fresh, json!(["new"]));

        // the previous entry is left untouched
        let entry = fetcher.cache().get(KEY).unwrap();
        assert_eq!(entry.validator.tag(), "1");
        assert_eq!(*entry.payload, json!(["old"]));
    }

    #[tokio::test]
    async fn test_not_modified_without_entry() {
        let fetcher = fetcher(5000, [not_modified()]);

        let err = fetcher.fetch(KEY, request()).await.unwrap_err();
        assert!(matches!(err, FetchError::MissingCacheEntry { ref key } if key == KEY));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_errors_leave_cache_untouched() {
        let fetcher = fetcher(
            5000,
            [
                ok(Some("1"), json!(["a"])),
                Err(HttpError::new(StatusCode::NOT_FOUND, "Not Found").into()),
                Err(anyhow::anyhow!("connection reset").into()),
            ],
        );
        fetcher.fetch(KEY, request()).await.unwrap();

        let err = fetcher.fetch(KEY, request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status, .. } if status == StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "Not Found");

        let err = fetcher.fetch(KEY, request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Unknown(_)));
        assert_eq!(err.to_string(), "connection reset");

        assert_eq!(*fetcher.cache().get(KEY).unwrap().payload, json!(["a"]));
    }

    #[tokio::test]
    async fn test_eviction_under_pressure() {
        // every entry weighs 18 bytes for the record plus 8 for the number
        let fetcher = fetcher(
            100,
            (0..5).map(|i| ok(Some(format!("{i}").as_str()), json!(i))),
        );

        for i in 0..5 {
            let key = format!("getContent$gobstones/demo${i}");
            fetcher.fetch(&key, request()).await.unwrap();
            let usage = fetcher.usage().raw;
            assert!(usage.used <= usage.limit);
            assert_eq!(usage.used + usage.remaining, usage.limit);
        }

        assert_eq!(fetcher.cache().len(), 3);
        assert!(fetcher.cache().get("getContent$gobstones/demo$0").is_none());
        assert!(fetcher.cache().get("getContent$gobstones/demo$4").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retrying_upstream() {
        let notifier = Arc::new(crate::notify::testing::RecordingNotifier::default());
        let scripted = Arc::new(ScriptedUpstream::new([
            crate::upstream::testing::throttled(RateLimitKind::PrimaryQuotaExhausted, 1),
            ok(Some("W/\"1234\""), json!([{"name": "file.txt"}])),
            not_modified(),
        ]));
        let cache = Arc::new(CacheStore::new(5000, entry_weigher()));
        let fetcher = ConditionalFetcher::new(
            cache,
            RetryingUpstream::new(Arc::clone(&scripted), notifier.clone()),
        );

        let first = fetcher.fetch(KEY, request()).await.unwrap();
        let second = fetcher.fetch(KEY, request()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(scripted.calls(), 3);
        assert_eq!(notifier.notices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch_leaves_cache_untouched() {
        let notifier = Arc::new(crate::notify::testing::RecordingNotifier::default());
        let scripted = Arc::new(ScriptedUpstream::new([
            ok(Some("W/\"1\""), json!(["old"])),
            crate::upstream::testing::throttled(RateLimitKind::PrimaryQuotaExhausted, 30),
            ok(Some("W/\"2\""), json!(["new"])),
        ]));
        let cache = Arc::new(CacheStore::new(5000, entry_weigher()));
        let fetcher = ConditionalFetcher::new(
            cache,
            RetryingUpstream::new(Arc::clone(&scripted), notifier),
        );

        fetcher.fetch(KEY, request()).await.unwrap();
        let usage = fetcher.usage();

        // gives up while backing off from the rate limit
        let cancelled =
            tokio::time::timeout(Duration::from_secs(10), fetcher.fetch(KEY, request())).await;
        assert!(cancelled.is_err());
        assert_eq!(scripted.calls(), 2);

        let entry = fetcher.cache().get(KEY).unwrap();
        assert_eq!(entry.validator.tag(), "1");
        assert_eq!(*entry.payload, json!(["old"]));
        assert_eq!(fetcher.usage(), usage);
    }
}
