use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::config::CacheConfig;
use super::entry::CacheEntry;
use super::stats::CacheStats;
use crate::clock::{Clock, system_clock};
use crate::ticker::Ticker;
use crate::types::Result;

/// In-memory key/value cache with per-entry TTL and LRU eviction
///
/// Expired entries are never returned. They are removed lazily by
/// [`Cache::get`] and in bulk by [`Cache::sweep`]. When the cache is full,
/// inserting a new key first evicts the least recently accessed entry.
///
/// All operations take `&self`; share the cache between tasks with an
/// [`Arc`].
#[derive(Debug)]
pub struct Cache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    seq: AtomicU64,
}

impl<V: Clone> Cache<V> {
    /// Create a cache driven by the system clock
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Create a cache driven by the given clock
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config, clock))
    }

    pub(crate) fn from_valid(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::with_capacity(config.max_size),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            seq: AtomicU64::new(0),
        }
    }

    /// Settings of this cache
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Uses the default TTL unless `ttl` is given. If the cache is full and
    /// `key` is new, the least recently accessed entry is evicted first.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = self.clock.now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_size {
            self.evict_lru();
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(value, ttl, now, self.next_seq());
        self.entries.insert(key, entry);
    }

    /// Remove the least recently accessed entry
    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().recency())
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            log::debug!("Evicting least recently used cache entry `{key}`");
            self.entries.remove(&key);
        }
    }

    /// Look up `key`, returning a copy of its value if it is live.
    ///
    /// A hit updates the access count and recency of the entry. An expired
    /// entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        let Some(mut entry) = self.entries.get_mut(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::debug!("Cache miss for `{key}`");
            return None;
        };

        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::debug!("Cache entry `{key}` expired");
            return None;
        }

        entry.touch(now, self.next_seq());
        self.hits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Cache hit for `{key}`");
        Some(entry.data().clone())
    }

    /// Returns `true` if `key` holds a live value.
    ///
    /// Unlike [`Cache::get`] this does not count as an access: it updates
    /// neither recency nor the hit and miss counters, and leaves expired
    /// entries in place.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove `key`, returning `true` if it was present
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the live value of `key`, or compute, store and return it.
    ///
    /// Concurrent misses on the same key each run their factory; the last
    /// one to finish wins.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged. Nothing is stored in that case.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: impl Into<String>,
        factory: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = key.into();
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = factory().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Current size and hit counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired(now))
            .count();
        CacheStats::new(
            self.entries.len(),
            self.config.max_size,
            expired,
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Remove every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    /// Run [`Cache::sweep`] every `cleanup_interval` on a background task
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_cleanup(self: &Arc<Self>) -> Ticker {
        Ticker::spawn(
            "cache-cleanup",
            self.config.cleanup_interval,
            Arc::downgrade(self),
            |cache: &Self| {
                let removed = cache.sweep();
                if removed > 0 {
                    log::info!("Removed {removed} expired cache entries");
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn cache<V: Clone>(max_size: usize, ttl: Duration) -> (Cache<V>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = Cache::with_clock(CacheConfig::new(max_size, ttl), clock.clone()).unwrap();
        (cache, clock)
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(Cache::<u8>::new(CacheConfig::new(0, Duration::from_secs(1))).is_err());
    }

    #[test]
    fn test_round_trip() {
        let (cache, _) = cache::<Value>(10, Duration::from_secs(60));
        cache.set("k", json!({"a": 1}), None);
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let (cache, _) = cache(2, Duration::from_secs(60));
        cache.set("k", 1, None);
        cache.set("k", 2, None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock) = cache(10, Duration::from_secs(60));
        cache.set("k", "v", Some(Duration::from_millis(100)));
        assert!(cache.has("k"));

        clock.advance(Duration::from_millis(150));
        assert!(!cache.has("k"));
        // `has` leaves the expired entry in place, `get` removes it
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_default_ttl() {
        let (cache, clock) = cache(10, Duration::from_secs(1));
        cache.set("short", 1, None);
        cache.set("long", 2, Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[test]
    fn test_lru_eviction() {
        let (cache, _) = cache(2, Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3, None);

        assert_eq!(cache.len(), 2);
        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn test_lru_eviction_follows_access_time() {
        let (cache, clock) = cache(2, Duration::from_secs(60));
        cache.set("a", 1, None);
        clock.advance(Duration::from_millis(10));
        cache.set("b", 2, None);
        clock.advance(Duration::from_millis(10));
        cache.get("a");
        clock.advance(Duration::from_millis(10));
        cache.set("c", 3, None);
        assert!(!cache.has("b"));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _) = cache(2, Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 3, None);
        assert_eq!(cache.len(), 2);
        assert!(cache.has("b"));
    }

    #[test]
    fn test_has_is_not_an_access() {
        let (cache, _) = cache(2, Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert!(cache.has("a"));
        cache.set("c", 3, None);
        assert!(!cache.has("a"));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _) = cache(10, Duration::from_secs(60));
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats() {
        let (cache, clock) = cache(5, Duration::from_secs(60));
        cache.set("live", 1, None);
        cache.set("stale", 2, Some(Duration::from_millis(10)));
        clock.advance(Duration::from_millis(20));

        cache.get("live");
        cache.get("live");
        cache.get("nothing");

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 5);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sweep() {
        let (cache, clock) = cache(10, Duration::from_secs(60));
        cache.set("a", 1, Some(Duration::from_millis(10)));
        cache.set("b", 2, Some(Duration::from_millis(10)));
        cache.set("c", 3, None);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_set() {
        let (cache, _) = cache(10, Duration::from_secs(60));

        let value: std::result::Result<_, ()> = cache.get_or_set("k", || async { Ok(1) }, None).await;
        assert_eq!(value, Ok(1));

        let value: std::result::Result<_, ()> =
            cache.get_or_set("k", || async { Ok(2) }, None).await;
        assert_eq!(value, Ok(1));
    }

    #[tokio::test]
    async fn test_get_or_set_error_stores_nothing() {
        let (cache, _) = cache::<u32>(10, Duration::from_secs(60));
        let value = cache
            .get_or_set("k", || async { Err("backend down") }, None)
            .await;
        assert_eq!(value, Err("backend down"));
        assert!(!cache.has("k"));
    }

    #[tokio::test]
    async fn test_cleanup_task() {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig {
            max_size: 10,
            default_ttl: Duration::from_millis(1),
            cleanup_interval: Duration::from_millis(5),
        };
        let cache = Arc::new(Cache::with_clock(config, clock.clone()).unwrap());
        cache.set("a", 1, None);
        clock.advance(Duration::from_secs(1));

        let cleanup = cache.spawn_cleanup();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cleanup.shutdown().await;

        assert!(cache.is_empty());
    }
}
