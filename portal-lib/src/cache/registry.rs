use serde_json::Value;
use std::sync::Arc;

use super::config::{CacheConfig, CachesConfig};
use super::stats::CachesStats;
use super::store::Cache;
use crate::clock::{Clock, system_clock};
use crate::ticker::Ticker;
use crate::types::{ApiResponse, Result};

/// The four named caches of the portal, each with its own profile
#[derive(Debug, Clone)]
pub struct Caches {
    /// Responses of [`crate::ApiClient`] GET requests
    pub api_responses: Arc<Cache<ApiResponse<Value>>>,
    /// Per-user data
    pub user_data: Arc<Cache<Value>>,
    /// Rarely changing content
    pub static_content: Arc<Cache<Value>>,
    /// Results of search queries
    pub search_results: Arc<Cache<Value>>,
}

impl Caches {
    /// Create all four caches, sharing one clock
    ///
    /// # Errors
    ///
    /// Returns an error if any of the configs is invalid
    pub fn new(config: &CachesConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            api_responses: Arc::new(Cache::with_clock(config.api_responses, clock.clone())?),
            user_data: Arc::new(Cache::with_clock(config.user_data, clock.clone())?),
            static_content: Arc::new(Cache::with_clock(config.static_content, clock.clone())?),
            search_results: Arc::new(Cache::with_clock(config.search_results, clock)?),
        })
    }

    /// Start the periodic cleanup of every cache
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn spawn_cleanups(&self) -> [Ticker; 4] {
        [
            self.api_responses.spawn_cleanup(),
            self.user_data.spawn_cleanup(),
            self.static_content.spawn_cleanup(),
            self.search_results.spawn_cleanup(),
        ]
    }

    /// Empty every cache
    pub fn clear_all(&self) {
        self.api_responses.clear();
        self.user_data.clear();
        self.static_content.clear();
        self.search_results.clear();
    }

    /// Stats of every cache
    #[must_use]
    pub fn stats(&self) -> CachesStats {
        CachesStats {
            api_responses: self.api_responses.stats(),
            user_data: self.user_data.stats(),
            static_content: self.static_content.stats(),
            search_results: self.search_results.stats(),
        }
    }
}

impl Default for Caches {
    fn default() -> Self {
        let clock = system_clock();
        Self {
            api_responses: Arc::new(Cache::from_valid(CacheConfig::api_responses(), clock.clone())),
            user_data: Arc::new(Cache::from_valid(CacheConfig::user_data(), clock.clone())),
            static_content: Arc::new(Cache::from_valid(CacheConfig::static_content(), clock.clone())),
            search_results: Arc::new(Cache::from_valid(CacheConfig::search_results(), clock)),
        }
    }
}
