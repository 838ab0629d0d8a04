use std::time::{Duration, Instant};

/// A value stored in a [`crate::Cache`] together with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    data: V,
    created: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed: Instant,
    /// Logical access order, breaks ties between equal `last_accessed`
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) const fn new(data: V, ttl: Duration, now: Instant, seq: u64) -> Self {
        Self {
            data,
            created: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            access_seq: seq,
        }
    }

    /// The stored value
    pub const fn data(&self) -> &V {
        &self.data
    }

    /// Lifetime of the entry
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of successful lookups
    pub const fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }

    /// Returns `true` once the entry has outlived its TTL.
    ///
    /// An entry aged exactly `ttl` is still live.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }

    pub(crate) const fn recency(&self) -> (Instant, u64) {
        (self.last_accessed, self.access_seq)
    }

    pub(crate) const fn touch(&mut self, now: Instant, seq: u64) {
        self.access_count += 1;
        self.last_accessed = now;
        self.access_seq = seq;
    }
}
