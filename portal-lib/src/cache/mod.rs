//! Time-to-live caches with least-recently-used eviction.
//!
//! A [`Cache`] maps string keys to cloned values. Each entry carries its own
//! TTL; the least recently accessed entry makes room when the cache is full.
//! [`Caches`] bundles the four named caches the portal uses.

mod config;
mod entry;
mod registry;
mod stats;
mod store;

pub use config::{CacheConfig, CachesConfig};
pub use entry::CacheEntry;
pub use registry::Caches;
pub use stats::{CacheStats, CachesStats};
pub use store::Cache;
