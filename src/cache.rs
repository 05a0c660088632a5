//! Time-bounded LRU cache for read-mostly lookups.

use crate::errors::Result;
use crate::utils::clock::{SharedClock, TokioClock};
use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::debug;

/// Default maximum number of cached entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default time-to-live of a cached entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache key: operation identity plus its full argument tuple.
///
/// Absent arguments are kept as `None` so that they never collide with an
/// empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: &'static str,
    args: Vec<Option<String>>,
}

impl CacheKey {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(Some(value.to_string()));
        self
    }

    /// Append an optional argument.
    pub fn opt_arg(mut self, value: Option<impl ToString>) -> Self {
        self.args.push(value.map(|v| v.to_string()));
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

struct CachedEntry {
    value: Value,
    stored_at: Instant,
}

/// Response cache shared by clones.
///
/// Entries expire after a fixed TTL or are evicted least-recently-used once
/// the capacity is reached, whichever happens first. Only successful results
/// are stored.
///
/// Every client gets its own cache unless one is injected through
/// [`VakSmsBuilder::cache`](crate::VakSmsBuilder::cache); injecting clones of
/// the same cache into several clients shares results between them, even
/// across API keys.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<LruCache<CacheKey, CachedEntry>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(TokioClock))
    }

    /// Create a cache measuring expiry with the given clock.
    pub fn with_clock(capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CachedEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Number of stored entries, expired ones included until looked up.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Look up a live entry. Expired entries are dropped.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired = match entries.peek(key) {
            Some(entry) => now.saturating_duration_since(entry.stored_at) >= self.ttl,
            None => return None,
        };
        if expired {
            entries.pop(key);
            return None;
        }

        let entry = entries.get(key)?;
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Store a result, evicting the least recently used entry when full.
    pub fn insert<T: Serialize>(&self, key: CacheKey, value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let stored_at = self.clock.now();
        self.lock().put(key, CachedEntry { value, stored_at });
    }

    /// Return the cached result for `key`, or run `fetch` and cache its
    /// success.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(&key) {
            #[cfg(feature = "tracing")]
            debug!(operation = key.operation(), "Cache hit");
            return Ok(hit);
        }

        #[cfg(feature = "tracing")]
        debug!(operation = key.operation(), "Cache miss");

        let value = fetch().await?;
        self.insert(key, &value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{VakSmsError, VakSmsServiceError};
    use crate::utils::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with_clock(capacity: usize) -> (ResponseCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = ResponseCache::with_clock(
            capacity,
            Duration::from_secs(3600),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn test_cache_key_distinguishes_none_from_empty() {
        let a = CacheKey::new("op").opt_arg(None::<&str>);
        let b = CacheKey::new("op").arg("");
        assert_ne!(a, b);
        assert_eq!(
            CacheKey::new("op").arg("tg").arg(1),
            CacheKey::new("op").arg("tg").arg("1")
        );
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_fetch() {
        let (cache, clock) = cache_with_clock(10);
        let calls = AtomicUsize::new(0);
        let key = CacheKey::new("getCountryList");

        for _ in 0..2 {
            let value: u32 = cache
                .get_or_fetch(key.clone(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
            clock.advance(Duration::from_secs(60));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let (cache, clock) = cache_with_clock(10);
        let key = CacheKey::new("getCountNumber").arg("tg");

        cache.insert(key.clone(), &1u32);
        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get::<u32>(&key), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<u32>(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let (cache, _clock) = cache_with_clock(2);
        let a = CacheKey::new("op").arg("a");
        let b = CacheKey::new("op").arg("b");
        let c = CacheKey::new("op").arg("c");

        cache.insert(a.clone(), &"a");
        cache.insert(b.clone(), &"b");
        // Touch `a` so `b` becomes the eviction candidate.
        assert_eq!(cache.get::<String>(&a).as_deref(), Some("a"));
        cache.insert(c.clone(), &"c");

        assert_eq!(cache.len(), 2);
        assert!(cache.get::<String>(&b).is_none());
        assert!(cache.get::<String>(&a).is_some());
        assert!(cache.get::<String>(&c).is_some());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let (cache, _clock) = cache_with_clock(10);
        let key = CacheKey::new("getCountNumber").arg("tg");
        let calls = AtomicUsize::new(0);

        let result: Result<u32> = cache
            .get_or_fetch(key.clone(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VakSmsError::from(VakSmsServiceError::new("noService")))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());

        let value: u32 = cache
            .get_or_fetch(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(3)
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = ResponseCache::new(0, DEFAULT_CACHE_TTL);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ResponseCache::default();
        let shared = cache.clone();
        shared.insert(CacheKey::new("op"), &true);
        assert_eq!(cache.get::<bool>(&CacheKey::new("op")), Some(true));
    }
}
