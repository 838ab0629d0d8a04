//! Per-identifier rate limiting.
//!
//! Requests are admitted by token buckets, one bucket per caller identity.
//! A bucket starts full, refills continuously and is capped at its quota.
//!
//! # Architecture
//!
//! - [`Identity`]: The caller a bucket belongs to
//! - [`TokenBucket`]: Token accounting of a single identity
//! - [`RateLimiter`]: Concurrent map of buckets sharing one quota
//! - [`RateLimiters`]: The API limiter and the stricter auth limiter
//! - [`RateLimitConfig`]: Quota of a limiter

mod bucket;
mod config;
mod key;
mod limiter;

pub use bucket::TokenBucket;
pub use config::{DEFAULT_SWEEP_INTERVAL, RateLimitConfig, RateLimitsConfig};
pub use key::{ANONYMOUS, Identity};
pub use limiter::{RateLimiter, RateLimiters};
