//! In-memory response cache with per-entry TTL and LRU eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default number of cached responses.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
/// Default time-to-live for a cached response.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Map plus recency order, guarded together by the outer mutex.
///
/// `recency` holds every cached key exactly once, least recently used at the
/// front. Hits move the key to the back; inserts beyond `max_size` evict
/// from the front.
#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    recency: VecDeque<String>,
    max_size: usize,
    default_ttl: Duration,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key.to_string());
    }

    fn forget(&mut self, key: &str) {
        self.map.remove(key);
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
    }
}

/// Shared response cache.
///
/// Expiry is lazy: an entry past its TTL is removed when it is next looked
/// up, not by a background sweeper. Clones share the same storage, so one
/// cache can back several clients.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL)
    }
}

impl ResponseCache {
    /// Create a cache holding at most `max_size` entries, each living for
    /// `default_ttl` unless the insert overrides it.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        assert!(max_size > 0, "cache max_size must be positive");

        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
                recency: VecDeque::new(),
                max_size,
                default_ttl,
            })),
        }
    }

    /// Look up a fresh entry, refreshing its recency on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let (body, expired) = {
            let entry = inner.map.get(key)?;
            (entry.body.clone(), entry.is_expired(now))
        };
        if expired {
            debug!("cache entry expired: {}", key);
            inner.forget(key);
            return None;
        }

        inner.touch(key);
        Some(body)
    }

    /// Insert a response, evicting least recently used entries when the
    /// cache is over capacity. `ttl` of `None` uses the cache default.
    pub async fn set(&self, key: &str, body: String, ttl: Option<Duration>) {
        let mut inner = self.inner.lock().await;

        let entry = CacheEntry {
            body,
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(inner.default_ttl),
        };
        inner.map.insert(key.to_string(), entry);
        inner.touch(key);

        while inner.map.len() > inner.max_size {
            let Some(oldest) = inner.recency.pop_front() else {
                break;
            };
            debug!("cache evicting least recently used entry: {}", oldest);
            inner.map.remove(&oldest);
        }
    }

    /// Remove one entry, if present.
    pub async fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.forget(key);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.map.clear();
        inner.recency.clear();
    }

    /// Number of entries currently stored, expired ones included until
    /// their next lookup.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_returns_entries() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));

        cache.set("k1", "v1".to_string(), None).await;
        assert_eq!(cache.get("k1").await, Some("v1".to_string()));
        assert_eq!(cache.get("k2").await, None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn overwriting_a_key_keeps_a_single_entry() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));

        cache.set("k1", "old".to_string(), None).await;
        cache.set("k1", "new".to_string(), None).await;

        assert_eq!(cache.get("k1").await, Some("new".to_string()));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_removed_on_lookup() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.set("k1", "v1".to_string(), None).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.get("k1").await, None);
        assert_eq!(cache.len().await, 0, "expired entry must be dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn per_entry_ttl_overrides_the_default() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache
            .set("short", "v".to_string(), Some(Duration::from_secs(1)))
            .await;
        cache.set("long", "v".to_string(), None).await;

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn eviction_removes_the_least_recently_used_entry() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));

        cache.set("a", "1".to_string(), None).await;
        cache.set("b", "2".to_string(), None).await;

        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get("a").await, Some("1".to_string()));
        cache.set("c", "3".to_string(), None).await;

        assert_eq!(cache.get("a").await, Some("1".to_string()));
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("c").await, Some("3".to_string()));
    }

    #[tokio::test]
    async fn delete_and_clear_remove_entries() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.set("a", "1".to_string(), None).await;
        cache.set("b", "2".to_string(), None).await;

        cache.delete("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clones_share_the_same_storage() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        let clone = cache.clone();

        cache.set("k", "v".to_string(), None).await;
        assert_eq!(clone.get("k").await, Some("v".to_string()));
    }

    #[test]
    #[should_panic(expected = "max_size must be positive")]
    fn zero_capacity_is_rejected() {
        let _ = ResponseCache::new(0, Duration::from_secs(60));
    }
}
