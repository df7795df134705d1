//! A byte bounded, least-recently-used response cache.
//!
//! Every entry remembers the validator (entity tag) the upstream sent along with the payload, so
//! that the next request for the same logical key can be made conditional. Entries only ever
//! disappear through eviction or overwrite, there is no expiry.

use std::fmt;
use std::sync::Arc;

use humansize::{DECIMAL, FormatSizeOptions, format_size};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

mod weight;

pub use weight::{entry_weigher, json_footprint, validator_footprint};


/// An opaque token identifying one version of an upstream resource.
///
/// Entity tags are normalized on the way in: the weak marker `W/` and the surrounding quotes are
/// stripped, so only the opaque tag is stored. [`header_value`](Self::header_value) restores the
/// quotes (but never the weak marker) when the validator is sent back upstream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Validator {
    tag: String,
    quoted: bool,
}

impl Validator {
    /// Normalizes a raw `ETag` header value.
    pub fn from_etag(etag: &str) -> Self {
        let etag = etag.trim();
        let etag = etag.strip_prefix("W/").unwrap_or(etag);

        match etag
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
        {
            Some(tag) => Self {
                tag: tag.to_owned(),
                quoted: true,
            },
            None => Self {
                tag: etag.to_owned(),
                quoted: false,
            },
        }
    }

    /// The opaque tag, without weak marker or quotes.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The value for an `If-None-Match` header.
    pub fn header_value(&self) -> String {
        if self.quoted {
            format!("\"{}\"", self.tag)
        } else {
            self.tag.clone()
        }
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// A cached upstream response.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry<T> {
    /// The validator the upstream sent along with `payload`.
    pub validator: Validator,
    /// The response body, exactly as it was stored.
    pub payload: T,
    /// The weight of this entry, computed once when it was stored.
    pub size: u64,
}

/// Computes the weight of an entry in bytes.
///
/// The returned weight is accounted against the byte budget of a [`CacheStore`].
pub type Weigher<T> = Arc<dyn Fn(&Validator, &T) -> u64 + Send + Sync>;

/// Byte counts of a [`CacheStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ByteCounts {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
}

/// [`ByteCounts`] rendered with decimal byte units, e.g. `5.00 KB`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HumanByteCounts {
    pub limit: String,
    pub used: String,
    pub remaining: String,
}

impl From<ByteCounts> for HumanByteCounts {
    fn from(raw: ByteCounts) -> Self {
        Self {
            limit: human_size(raw.limit),
            used: human_size(raw.used),
            remaining: human_size(raw.remaining),
        }
    }
}

/// Formats a byte count with decimal units and two decimal places, e.g. `4.95 KB`.
pub fn human_size(bytes: u64) -> String {
    let formatted = format_size(
        bytes,
        FormatSizeOptions::from(DECIMAL)
            .decimal_places(2)
            .decimal_zeroes(2),
    );
    // clients expect the kilo prefix in upper case, like every other prefix
    match formatted.strip_suffix(" kB") {
        Some(value) => format!("{value} KB"),
        None => formatted,
    }
}

/// Current budget and usage of a [`CacheStore`], as raw numbers and human readable strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheUsage {
    pub raw: ByteCounts,
    pub human: HumanByteCounts,
}

struct Inner<T> {
    entries: LruCache<String, CacheEntry<T>>,
    used: u64,
}

/// A key/value store bounded by the summed weight of its entries.
///
/// Both [`get`](Self::get) and [`put`](Self::put) count as a use of the entry. When storing an
/// entry would exceed the budget, the least recently used entries are evicted until it fits.
///
/// All state sits behind one mutex which is only held for the bookkeeping itself, never while
/// weighing a payload.
pub struct CacheStore<T> {
    limit: u64,
    weigher: Weigher<T>,
    inner: Mutex<Inner<T>>,
}

impl<T> fmt::Debug for CacheStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (entries, used) = self
            .inner
            .try_lock()
            .map(|inner| (inner.entries.len(), inner.used))
            .unwrap_or_default();
        f.debug_struct("CacheStore")
            .field("limit", &self.limit)
            .field("entries", &entries)
            .field("used", &used)
            .finish()
    }
}

impl<T: Clone> CacheStore<T> {
    /// Creates an empty store holding at most `limit` bytes as computed by `weigher`.
    pub fn new(limit: u64, weigher: Weigher<T>) -> Self {
        Self {
            limit,
            weigher,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used: 0,
            }),
        }
    }

    /// Looks up `key` and marks it as most recently used.
    ///
    /// A missing key is not an error and leaves the recency order untouched.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Inserts or replaces the entry for `key`, evicting least recently used entries as needed.
    ///
    /// An entry that alone weighs more than the whole budget is not stored. In that case any
    /// previous entry for `key` is removed as well, so the key is left uncached, and `false` is
    /// returned.
    pub fn put(&self, key: impl Into<String>, validator: Validator, payload: T) -> bool {
        let key = key.into();
        let size = (self.weigher)(&validator, &payload);

        let mut inner = self.inner.lock();
        if let Some(previous) = inner.entries.pop(&key) {
            inner.used -= previous.size;
        }

        if size > self.limit {
            tracing::warn!(
                key = %key,
                size,
                limit = self.limit,
                "dropping cache entry larger than the cache budget"
            );
            metric!(counter("cache.oversized") += 1);
            metric!(gauge("cache.used_bytes") = inner.used);
            return false;
        }

        while inner.used + size > self.limit {
            let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.used -= evicted.size;
            tracing::debug!(key = %evicted_key, size = evicted.size, "evicted cache entry");
            metric!(counter("cache.evicted") += 1);
        }

        inner.entries.put(
            key,
            CacheEntry {
                validator,
                payload,
                size,
            },
        );
        inner.used += size;
        metric!(gauge("cache.used_bytes") = inner.used);

        true
    }

    /// The configured budget and the current usage.
    pub fn usage(&self) -> CacheUsage {
        let used = self.inner.lock().used;
        let raw = ByteCounts {
            limit: self.limit,
            used,
            remaining: self.limit - used,
        };

        CacheUsage {
            raw,
            human: raw.into(),
        }
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
