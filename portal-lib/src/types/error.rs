use std::hash::Hash;
use std::time::Duration;

use http::StatusCode;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::client::BackendError;

/// Machine-readable code for a request that ran out of quota.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
/// Machine-readable code for an attempt that was aborted locally.
pub const TIMEOUT: &str = "TIMEOUT";
/// Machine-readable code for a transport failure.
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
/// Machine-readable code for unexpected failures.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Machine-readable code for requests that could not be built.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Possible errors when talking to the portal backend through `portal_lib`
///
/// Every variant carries a numeric [`status`](ErrorKind::status) and an
/// optional machine-readable [`code`](ErrorKind::code), so callers can
/// branch on them (e.g. show "retry later" on 429, re-authenticate on 401).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller used up its request quota for the current window
    #[error("Too many requests. Please try again in {}ms", .retry_after.as_millis())]
    RateLimitExceeded {
        /// Time until the next request would be admitted
        retry_after: Duration,
    },

    /// A single attempt did not complete before the configured timeout
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The request could not be delivered, e.g. connection refused or reset
    #[error("Network error while trying to reach the API: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-success status code
    #[error("Server responded with {status}: {message}")]
    RejectedStatusCode {
        /// Status code returned by the server
        status: StatusCode,
        /// Message supplied by the server, or the canonical reason
        message: String,
        /// Error code supplied by the server, if any
        code: Option<String>,
    },

    /// The managed backend reported a failed query
    #[error("Backend query failed: {message}")]
    Backend {
        /// Message reported by the backend
        message: String,
        /// Status reported by the backend, if any
        status: Option<u16>,
        /// Error code reported by the backend, if any
        code: Option<String>,
    },

    /// An unexpected failure while talking to the backend
    #[error("Internal error: {0}")]
    Internal(String),

    /// The endpoint cannot be turned into an absolute URL
    #[error("Cannot parse `{0}` as API endpoint: {1}")]
    InvalidUrl(String, #[source] url::ParseError),

    /// A header value could not be parsed
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// A header name could not be parsed
    #[error("Header name could not be parsed.")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// A rate limiter was configured with an unusable quota
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// A cache was configured with an unusable size or TTL
    #[error("Invalid cache configuration: {0}")]
    InvalidCacheConfig(String),

    /// The HTTP request or client could not be built
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// A JSON payload could not be encoded or decoded
    #[error("Cannot process JSON payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server answered with a success status but the body is not JSON
    #[error("Server responded with {status} but the body is not valid JSON: {source}")]
    InvalidResponseBody {
        /// Status code returned by the server
        status: StatusCode,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },
}

impl ErrorKind {
    /// The HTTP-like status of this error.
    ///
    /// Local failures without a server response use the synthetic statuses
    /// 408 (timeout) and 0 (network or invalid request).
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS.as_u16(),
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT.as_u16(),
            Self::RejectedStatusCode { status, .. } => status.as_u16(),
            Self::Backend { status, .. } => {
                status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
            }
            Self::Internal(_) | Self::Serialization(_) | Self::InvalidResponseBody { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR.as_u16()
            }
            Self::Network(_)
            | Self::InvalidUrl(..)
            | Self::InvalidHeader(_)
            | Self::InvalidHeaderName(_)
            | Self::InvalidRateLimit(_)
            | Self::InvalidCacheConfig(_)
            | Self::BuildRequestClient(_) => 0,
        }
    }

    /// The machine-readable error code, if there is one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::RateLimitExceeded { .. } => Some(RATE_LIMIT_EXCEEDED),
            Self::Timeout(_) => Some(TIMEOUT),
            Self::Network(_) => Some(NETWORK_ERROR),
            Self::RejectedStatusCode { code, .. } | Self::Backend { code, .. } => code.as_deref(),
            Self::Internal(_) | Self::Serialization(_) | Self::InvalidResponseBody { .. } => {
                Some(INTERNAL_ERROR)
            }
            Self::InvalidUrl(..)
            | Self::InvalidHeader(_)
            | Self::InvalidHeaderName(_)
            | Self::InvalidRateLimit(_)
            | Self::InvalidCacheConfig(_)
            | Self::BuildRequestClient(_) => Some(INVALID_REQUEST),
        }
    }

    /// Returns `true` if the caller should back off before trying again
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Returns `true` if the caller should re-authenticate
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == StatusCode::UNAUTHORIZED.as_u16()
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Network(e1), Self::Network(e2))
            | (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::Serialization(e1), Self::Serialization(e2)) => e1.to_string() == e2.to_string(),
            (
                Self::InvalidResponseBody {
                    status: s1,
                    source: e1,
                },
                Self::InvalidResponseBody {
                    status: s2,
                    source: e2,
                },
            ) => s1 == s2 && e1.to_string() == e2.to_string(),
            (Self::InvalidUrl(s1, e1), Self::InvalidUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::InvalidHeaderName(_), Self::InvalidHeaderName(_)) => true,
            (
                Self::RateLimitExceeded { retry_after: r1 },
                Self::RateLimitExceeded { retry_after: r2 },
            ) => r1 == r2,
            (Self::Timeout(t1), Self::Timeout(t2)) => t1 == t2,
            (
                Self::RejectedStatusCode {
                    status: s1,
                    message: m1,
                    code: c1,
                },
                Self::RejectedStatusCode {
                    status: s2,
                    message: m2,
                    code: c2,
                },
            ) => s1 == s2 && m1 == m2 && c1 == c2,
            (
                Self::Backend {
                    message: m1,
                    status: s1,
                    code: c1,
                },
                Self::Backend {
                    message: m2,
                    status: s2,
                    code: c2,
                },
            ) => m1 == m2 && s1 == s2 && c1 == c2,
            (Self::Internal(m1), Self::Internal(m2))
            | (Self::InvalidRateLimit(m1), Self::InvalidRateLimit(m2))
            | (Self::InvalidCacheConfig(m1), Self::InvalidCacheConfig(m2)) => m1 == m2,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        std::mem::discriminant(self).hash(state);
        self.status().hash(state);
        self.to_string().hash(state);
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<BackendError> for ErrorKind {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Query {
                message,
                status,
                code,
            } => Self::Backend {
                message,
                status,
                code,
            },
            BackendError::Unexpected(message) => Self::Internal(message),
        }
    }
}
