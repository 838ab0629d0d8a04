use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::bucket::TokenBucket;
use super::config::{RateLimitConfig, RateLimitsConfig};
use super::key::Identity;
use crate::clock::{Clock, system_clock};
use crate::ticker::Ticker;
use crate::types::Result;

/// Endpoint fragments that route a request through the auth limiter
const AUTH_ENDPOINT_MARKERS: [&str; 3] = ["auth", "login", "signup"];

/// Per-identifier token-bucket rate limiter
///
/// Each identifier gets its own bucket on first use, starting at full
/// capacity. Buckets are kept in a concurrent map, so a limiter can be
/// shared between tasks behind an [`Arc`]. Updates to a single bucket are
/// atomic: under concurrent calls for the same identifier, no more than
/// the bucket's tokens are ever handed out.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    refill_rate: f64,
    buckets: DashMap<Identity, TokenBucket>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter driven by the system clock
    ///
    /// # Errors
    ///
    /// Returns an error if the quota is invalid
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Create a limiter driven by the given clock
    ///
    /// # Errors
    ///
    /// Returns an error if the quota is invalid
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config, clock))
    }

    fn from_valid(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            refill_rate: config.refill_rate(),
            config,
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Quota this limiter enforces
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Refill the bucket of `identifier` and run `f` on it while holding
    /// the map shard lock, creating a full bucket first if needed
    fn with_bucket<R>(&self, identifier: &str, f: impl FnOnce(&mut TokenBucket) -> R) -> R {
        let now = self.clock.now();
        let mut bucket = self
            .buckets
            .entry(Identity::from(identifier))
            .or_insert_with(|| TokenBucket::full(self.config.max_requests, self.refill_rate, now));
        bucket.refill(now);
        f(bucket.value_mut())
    }

    /// Refill the bucket of `identifier`, then take one token if available.
    ///
    /// Returns `true` if the request is admitted.
    pub fn is_allowed(&self, identifier: impl AsRef<str>) -> bool {
        let identifier = identifier.as_ref();
        let allowed = self.with_bucket(identifier, TokenBucket::try_consume);
        if !allowed {
            log::debug!("Rate limit exceeded for `{identifier}`");
        }
        allowed
    }

    /// Whole tokens currently available to `identifier`, after refilling
    pub fn remaining_tokens(&self, identifier: impl AsRef<str>) -> u32 {
        self.with_bucket(identifier.as_ref(), |bucket| bucket.remaining())
    }

    /// Time until `identifier` gets its next whole token.
    ///
    /// Zero if a token is available right now. An identifier that was never
    /// seen has a full bucket, so this is zero for it as well.
    pub fn time_until_reset(&self, identifier: impl AsRef<str>) -> Duration {
        self.with_bucket(identifier.as_ref(), |bucket| bucket.time_until_next_token())
    }

    /// Number of identifiers currently tracked
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that were not touched for more than two windows.
    ///
    /// Such a bucket would be full again anyway, so dropping it does not
    /// change what its identifier is allowed to do. Returns the number of
    /// buckets removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let max_idle = self.config.window.saturating_mul(2);
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.idle_for(now) <= max_idle);
        before.saturating_sub(self.buckets.len())
    }

    /// Run [`RateLimiter::sweep`] every `period` on a background task
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> Ticker {
        Ticker::spawn("rate-limit-sweep", period, Arc::downgrade(self), |limiter: &Self| {
            let removed = limiter.sweep();
            if removed > 0 {
                log::info!("Removed {removed} idle rate limit bucket(s)");
            }
        })
    }
}

/// The general API limiter and the stricter auth limiter, side by side
#[derive(Debug, Clone)]
pub struct RateLimiters {
    /// Limiter for general API calls
    pub api: Arc<RateLimiter>,
    /// Limiter for authentication, login and signup endpoints
    pub auth: Arc<RateLimiter>,
}

impl RateLimiters {
    /// Create both limiters from their quotas, sharing one clock
    ///
    /// # Errors
    ///
    /// Returns an error if either quota is invalid
    pub fn new(config: &RateLimitsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            api: Arc::new(RateLimiter::with_clock(config.api, clock.clone())?),
            auth: Arc::new(RateLimiter::with_clock(config.auth, clock)?),
        })
    }

    /// Pick the limiter responsible for `endpoint`.
    ///
    /// Endpoints mentioning `auth`, `login` or `signup` in any letter case
    /// go through the auth limiter, everything else through the API limiter.
    #[must_use]
    pub fn for_endpoint(&self, endpoint: &str) -> &Arc<RateLimiter> {
        let endpoint = endpoint.to_ascii_lowercase();
        if AUTH_ENDPOINT_MARKERS.iter().any(|m| endpoint.contains(m)) {
            &self.auth
        } else {
            &self.api
        }
    }

    /// Start the periodic sweep of both limiters
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn spawn_sweepers(&self, period: Duration) -> [Ticker; 2] {
        [
            self.api.spawn_sweeper(period),
            self.auth.spawn_sweeper(period),
        ]
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        let clock = system_clock();
        Self {
            api: Arc::new(RateLimiter::from_valid(RateLimitConfig::api(), clock.clone())),
            auth: Arc::new(RateLimiter::from_valid(RateLimitConfig::auth(), clock)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn limiter(max_requests: u32, window: Duration) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(
            RateLimitConfig {
                max_requests,
                window,
            },
            clock.clone(),
        )
        .unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_rejects_invalid_quota() {
        let result = RateLimiter::new(RateLimitConfig {
            max_requests: 0,
            window: Duration::from_secs(1),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_fresh_identifier_has_full_bucket() {
        let (limiter, _) = limiter(5, Duration::from_secs(10));
        assert_eq!(limiter.remaining_tokens("new"), 5);
        assert_eq!(limiter.time_until_reset("other"), Duration::ZERO);
    }

    #[test]
    fn test_admits_up_to_capacity() {
        let (limiter, _) = limiter(3, Duration::from_secs(60));
        assert!(limiter.is_allowed("user"));
        assert!(limiter.is_allowed("user"));
        assert!(limiter.is_allowed("user"));
        assert!(!limiter.is_allowed("user"));
        assert_eq!(limiter.remaining_tokens("user"), 0);
    }

    #[test]
    fn test_remaining_decreases_monotonically() {
        let (limiter, _) = limiter(10, Duration::from_secs(600));
        let mut previous = limiter.remaining_tokens("user");
        while limiter.is_allowed("user") {
            let remaining = limiter.remaining_tokens("user");
            assert!(remaining < previous);
            previous = remaining;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_refill_over_time() {
        // 5 tokens per 10s is one token every 2s
        let (limiter, clock) = limiter(5, Duration::from_secs(10));
        for _ in 0..5 {
            assert!(limiter.is_allowed("user"));
        }
        assert!(!limiter.is_allowed("user"));
        assert_eq!(limiter.time_until_reset("user"), Duration::from_secs(2));

        clock.advance(Duration::from_secs(2));
        assert_eq!(limiter.remaining_tokens("user"), 1);
        assert_eq!(limiter.time_until_reset("user"), Duration::ZERO);
        assert!(limiter.is_allowed("user"));
        assert!(!limiter.is_allowed("user"));
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let (limiter, clock) = limiter(2, Duration::from_secs(1));
        assert!(limiter.is_allowed("user"));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.remaining_tokens("user"), 2);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (limiter, _) = limiter(1, Duration::from_secs(60));
        assert!(limiter.is_allowed("alice"));
        assert!(!limiter.is_allowed("alice"));
        assert!(limiter.is_allowed("bob"));
        assert!(limiter.is_allowed(Identity::anonymous()));
    }

    #[test]
    fn test_sweep_removes_idle_buckets() {
        let (limiter, clock) = limiter(5, Duration::from_secs(10));
        assert!(limiter.is_allowed("idle"));
        clock.advance(Duration::from_secs(15));
        assert!(limiter.is_allowed("active"));
        assert_eq!(limiter.sweep(), 0);

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked(), 1);
        // A swept identifier starts over with a full bucket
        assert_eq!(limiter.remaining_tokens("idle"), 5);
    }

    #[tokio::test]
    async fn test_concurrent_consumption_is_bounded() {
        let (limiter, _) = limiter(50, Duration::from_secs(3600));
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.is_allowed("shared") })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 50);
    }

    #[tokio::test]
    async fn test_sweeper_task() {
        let (limiter, clock) = limiter(1, Duration::from_millis(10));
        let limiter = Arc::new(limiter);
        assert!(limiter.is_allowed("user"));
        clock.advance(Duration::from_secs(1));

        let sweeper = limiter.spawn_sweeper(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.shutdown().await;

        assert_eq!(limiter.tracked(), 0);
    }

    #[rstest]
    #[case("/auth/session", true)]
    #[case("/Login", true)]
    #[case("/users/SIGNUP", true)]
    #[case("/users/42", false)]
    #[case("/search?q=dogs", false)]
    fn test_endpoint_routing(#[case] endpoint: &str, #[case] is_auth: bool) {
        let limiters = RateLimiters::default();
        let limiter = limiters.for_endpoint(endpoint);
        assert_eq!(Arc::ptr_eq(limiter, &limiters.auth), is_auth);
    }
}
