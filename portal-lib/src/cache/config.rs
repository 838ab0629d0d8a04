use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default interval between sweeps of expired entries
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Capacity and lifetime settings of a [`crate::Cache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of entries before the least recently used is evicted
    pub max_size: usize,

    /// Lifetime of entries stored without an explicit TTL
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Interval of the background sweep of expired entries
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,
}

const fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

impl CacheConfig {
    /// Create a config with the default cleanup interval
    #[must_use]
    pub const fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Profile for API responses: 5 minutes, 100 entries
    #[must_use]
    pub const fn api_responses() -> Self {
        Self::new(100, Duration::from_secs(5 * 60))
    }

    /// Profile for user data: 10 minutes, 50 entries
    #[must_use]
    pub const fn user_data() -> Self {
        Self::new(50, Duration::from_secs(10 * 60))
    }

    /// Profile for static content: 1 hour, 200 entries
    #[must_use]
    pub const fn static_content() -> Self {
        Self::new(200, Duration::from_secs(60 * 60))
    }

    /// Profile for search results: 2 minutes, 50 entries
    #[must_use]
    pub const fn search_results() -> Self {
        Self::new(50, Duration::from_secs(2 * 60))
    }

    /// Reject caches that could never hold an entry
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidCacheConfig`] if `max_size` is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(ErrorKind::InvalidCacheConfig(
                "max_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::api_responses()
    }
}

/// Settings of the four named caches in [`crate::Caches`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CachesConfig {
    /// Responses of [`crate::ApiClient`] GET requests
    #[serde(default = "CacheConfig::api_responses")]
    pub api_responses: CacheConfig,
    /// Per-user data
    #[serde(default = "CacheConfig::user_data")]
    pub user_data: CacheConfig,
    /// Rarely changing content
    #[serde(default = "CacheConfig::static_content")]
    pub static_content: CacheConfig,
    /// Results of search queries
    #[serde(default = "CacheConfig::search_results")]
    pub search_results: CacheConfig,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            api_responses: CacheConfig::api_responses(),
            user_data: CacheConfig::user_data(),
            static_content: CacheConfig::static_content(),
            search_results: CacheConfig::search_results(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        assert_eq!(
            CacheConfig::api_responses(),
            CacheConfig::new(100, Duration::from_secs(300))
        );
        assert_eq!(CacheConfig::user_data().max_size, 50);
        assert_eq!(
            CacheConfig::static_content().default_ttl,
            Duration::from_secs(3600)
        );
        assert_eq!(
            CacheConfig::search_results().default_ttl,
            Duration::from_secs(120)
        );
        assert_eq!(
            CacheConfig::search_results().cleanup_interval,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_validate() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(matches!(
            CacheConfig::new(0, Duration::from_secs(1)).validate(),
            Err(ErrorKind::InvalidCacheConfig(_))
        ));
    }

    #[test]
    fn test_cleanup_interval_defaults() {
        let config: CacheConfig = toml::from_str(
            r#"
            max_size = 10
            default_ttl = "30s"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.default_ttl, Duration::from_secs(30));
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_partial_caches_config() {
        let config: CachesConfig = toml::from_str(
            r#"
            [user_data]
            max_size = 5
            default_ttl = "1m"
            cleanup_interval = "10s"
            "#,
        )
        .unwrap();
        assert_eq!(config.api_responses, CacheConfig::api_responses());
        assert_eq!(config.user_data.max_size, 5);
        assert_eq!(config.user_data.cleanup_interval, Duration::from_secs(10));
    }
}
