use std::fmt::Display;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Plain, serializable snapshot of a failed request.
///
/// This is what ends up inside an [`ApiResponse`] when a failure is reported
/// in-band (e.g. by [`crate::ApiClient::batch_requests`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable description
    pub message: String,
    /// HTTP-like status code
    pub status: u16,
    /// Machine-readable code, e.g. `RATE_LIMIT_EXCEEDED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&ErrorKind> for ApiError {
    fn from(e: &ErrorKind) -> Self {
        Self {
            message: e.to_string(),
            status: e.status(),
            code: e.code().map(ToOwned::to_owned),
        }
    }
}

impl From<ErrorKind> for ApiError {
    fn from(e: ErrorKind) -> Self {
        Self::from(&e)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {} ({code})", self.status, self.message),
            None => write!(f, "[{}] {}", self.status, self.message),
        }
    }
}

/// Either the payload of a successful request or the error of a failed one
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseBody<T> {
    /// Payload of a successful request
    Data(T),
    /// Description of a failed request
    Error(ApiError),
}

/// Result of a call through [`crate::ApiClient`]
///
/// Exactly one of data or error is present. `status` is always set and
/// `cached` is only `true` if the response was served from the cache without
/// a network round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    /// Payload or error
    #[serde(flatten)]
    pub body: ResponseBody<T>,
    /// HTTP-like status code
    pub status: u16,
    /// Whether the response was served from the cache
    pub cached: bool,
    /// Requests left in the caller's quota after this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_requests: Option<u32>,
    /// Point in time at which the next request will be admitted
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<SystemTime>,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `data`
    #[must_use]
    pub const fn success(status: u16, data: T) -> Self {
        Self {
            body: ResponseBody::Data(data),
            status,
            cached: false,
            remaining_requests: None,
            reset_time: None,
        }
    }

    /// An in-band failure built from `error`
    #[must_use]
    pub fn from_error(error: &ErrorKind) -> Self {
        let error = ApiError::from(error);
        Self {
            status: error.status,
            body: ResponseBody::Error(error),
            cached: false,
            remaining_requests: None,
            reset_time: None,
        }
    }

    /// The payload, if the request succeeded
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match &self.body {
            ResponseBody::Data(data) => Some(data),
            ResponseBody::Error(_) => None,
        }
    }

    /// The error, if the request failed
    #[must_use]
    pub const fn error(&self) -> Option<&ApiError> {
        match &self.body {
            ResponseBody::Data(_) => None,
            ResponseBody::Error(error) => Some(error),
        }
    }

    /// Returns `true` if the response carries data
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.body, ResponseBody::Data(_))
    }

    /// Consume the response and return its payload or error
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of a failed response
    pub fn into_result(self) -> Result<T, ApiError> {
        match self.body {
            ResponseBody::Data(data) => Ok(data),
            ResponseBody::Error(error) => Err(error),
        }
    }

    /// Mark the response as served from the cache
    #[must_use]
    pub fn into_cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Attach the caller's remaining quota.
    ///
    /// `reset_time` is `None` when it lies beyond what `SystemTime` can hold.
    #[must_use]
    pub fn with_quota(mut self, remaining: u32, reset_time: Option<SystemTime>) -> Self {
        self.remaining_requests = Some(remaining);
        self.reset_time = reset_time;
        self
    }

    /// Convert the payload, keeping status and metadata
    ///
    /// # Errors
    ///
    /// Returns the error of `f` if the payload cannot be converted
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<ApiResponse<U>, E> {
        let body = match self.body {
            ResponseBody::Data(data) => ResponseBody::Data(f(data)?),
            ResponseBody::Error(error) => ResponseBody::Error(error),
        };
        Ok(ApiResponse {
            body,
            status: self.status,
            cached: self.cached,
            remaining_requests: self.remaining_requests,
            reset_time: self.reset_time,
        })
    }
}
