use serde::Serialize;

/// Point-in-time counters of a [`crate::Cache`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, expired ones included
    pub size: usize,
    /// Capacity of the cache
    pub max_size: usize,
    /// Stored entries that have outlived their TTL but were not removed yet
    pub expired: usize,
    /// Lookups that returned a live value
    pub hits: u64,
    /// Lookups that found nothing or an expired value
    pub misses: u64,
    /// Share of lookups that were hits, in `[0, 1]`
    pub hit_rate: f64,
}

impl CacheStats {
    pub(crate) fn new(size: usize, max_size: usize, expired: usize, hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            size,
            max_size,
            expired,
            hits,
            misses,
            hit_rate,
        }
    }
}

/// Stats of every cache in a [`crate::Caches`] registry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CachesStats {
    /// Stats of the API response cache
    pub api_responses: CacheStats,
    /// Stats of the user data cache
    pub user_data: CacheStats,
    /// Stats of the static content cache
    pub static_content: CacheStats,
    /// Stats of the search results cache
    pub search_results: CacheStats,
}
