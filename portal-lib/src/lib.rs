//! `portal` is the client-side service layer of the achievement benefits
//! portal. It talks to the portal API through an [`ApiClient`] that caches,
//! rate-limits, retries and times out requests, and records client-side
//! telemetry with a [`PerformanceMonitor`].
//!
//! "Hello world" example:
//! ```no_run
//! use portal_lib::{ClientBuilder, Result};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::default().client()?;
//!   let response = client.get::<Value>("https://api.example.edu/v1/benefits").await?;
//!   println!("{:?}", response.data());
//!   Ok(())
//! }
//! ```
//!
//! The building blocks can be used on their own as well:
//!
//! ```
//! use portal_lib::{Cache, CacheConfig, RateLimitConfig, RateLimiter, Result};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!   let limiter = RateLimiter::new(RateLimitConfig::auth())?;
//!   assert!(limiter.is_allowed("alice"));
//!   assert_eq!(limiter.remaining_tokens("alice"), 4);
//!
//!   let cache = Cache::new(CacheConfig::new(10, Duration::from_secs(60)))?;
//!   cache.set("greeting", "hello", None);
//!   assert_eq!(cache.get("greeting"), Some("hello"));
//!   Ok(())
//! }
//! ```
#![warn(missing_docs)]

mod client;
mod retry;
mod time;
mod types;

pub mod cache;
pub mod clock;
pub mod monitor;
pub mod ratelimit;
pub mod security;
pub mod ticker;

pub use cache::{Cache, CacheConfig, CacheStats, Caches, CachesConfig, CachesStats};
pub use client::{
    ApiClient, Backend, BackendError, BatchRequest, ClientBuilder, ClientConfig,
    DEFAULT_BATCH_CONCURRENCY, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT, RequestOptions,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use monitor::{EventSink, HostEvent, ListenerHandle, PerformanceMonitor};
pub use ratelimit::{Identity, RateLimitConfig, RateLimitsConfig, RateLimiter, RateLimiters};
pub use ticker::Ticker;
pub use types::*;
