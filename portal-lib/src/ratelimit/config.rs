use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default quota for general API calls
const DEFAULT_API_MAX_REQUESTS: u32 = 100;

/// Default quota for authentication endpoints
const DEFAULT_AUTH_MAX_REQUESTS: u32 = 5;

/// Default window over which a quota refills completely
const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default interval between sweeps of idle buckets
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Quota of a single token-bucket rate limiter
///
/// A bucket holds up to `max_requests` tokens and refills continuously at
/// `max_requests / window` tokens per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Capacity of each bucket
    pub max_requests: u32,

    /// Time it takes an empty bucket to refill completely
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl RateLimitConfig {
    /// Quota for general API calls: 100 requests per 15 minutes
    #[must_use]
    pub const fn api() -> Self {
        Self {
            max_requests: DEFAULT_API_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }

    /// Quota for authentication endpoints: 5 requests per 15 minutes
    #[must_use]
    pub const fn auth() -> Self {
        Self {
            max_requests: DEFAULT_AUTH_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }

    /// Tokens added per second
    #[must_use]
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.max_requests) / self.window.as_secs_f64()
    }

    /// Reject quotas that could never admit a request or never refill
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRateLimit`] if `max_requests` or `window`
    /// is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(ErrorKind::InvalidRateLimit(
                "max_requests must be at least 1".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(ErrorKind::InvalidRateLimit(
                "window must be longer than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::api()
    }
}

/// Quotas of the two independent limiters used by [`crate::ApiClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitsConfig {
    /// Quota for general API calls
    #[serde(default = "RateLimitConfig::api")]
    pub api: RateLimitConfig,

    /// Quota for authentication, login and signup endpoints
    #[serde(default = "RateLimitConfig::auth")]
    pub auth: RateLimitConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            api: RateLimitConfig::api(),
            auth: RateLimitConfig::auth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let api = RateLimitConfig::api();
        assert_eq!(api.max_requests, 100);
        assert_eq!(api.window, Duration::from_secs(900));

        let auth = RateLimitConfig::auth();
        assert_eq!(auth.max_requests, 5);
        assert_eq!(auth.window, Duration::from_secs(900));
    }

    #[test]
    fn test_refill_rate() {
        let config = RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(10),
        };
        assert!((config.refill_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate() {
        assert!(RateLimitConfig::api().validate().is_ok());

        let empty = RateLimitConfig {
            max_requests: 0,
            window: Duration::from_secs(1),
        };
        assert!(matches!(
            empty.validate(),
            Err(ErrorKind::InvalidRateLimit(_))
        ));

        let instant = RateLimitConfig {
            max_requests: 1,
            window: Duration::ZERO,
        };
        assert!(instant.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig {
            max_requests: 15,
            window: Duration::from_secs(60),
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_limits_config() {
        let config: RateLimitsConfig = toml::from_str(
            r#"
            [auth]
            max_requests = 3
            window = "1m"
            "#,
        )
        .unwrap();

        assert_eq!(config.api, RateLimitConfig::api());
        assert_eq!(config.auth.max_requests, 3);
        assert_eq!(config.auth.window, Duration::from_secs(60));
    }
}
