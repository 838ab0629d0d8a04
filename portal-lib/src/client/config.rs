use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT};

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

const fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

const fn default_true() -> bool {
    true
}

/// Serializable defaults of an [`crate::ApiClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Timeout of a single attempt
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Attempts per request, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled for every further one
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// User agent, instead of `portal/<version>`
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Whether the hardening headers are sent
    #[serde(default = "default_true")]
    pub security_headers: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            user_agent: None,
            security_headers: true,
        }
    }
}
