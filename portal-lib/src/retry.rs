use http::StatusCode;

use crate::ErrorKind;

/// Status codes that are never retried: the request itself is at fault
const TERMINAL_STATUS_CODES: [StatusCode; 4] = [
    StatusCode::UNAUTHORIZED,
    StatusCode::FORBIDDEN,
    StatusCode::NOT_FOUND,
    StatusCode::UNPROCESSABLE_ENTITY,
];

/// An extension trait to help determine if a failed request
/// is worth another attempt.
///
/// Inspired by `Retryable` in [reqwest-middleware].
///
/// [reqwest-middleware]: https://github.com/TrueLayer/reqwest-middleware/blob/f854725791ccf4a02c401a26cab3d9db753f468c/reqwest-retry/src/retryable.rs
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    /// Every unsuccessful status is transient, except for the ones the
    /// server uses to say that retrying the same request cannot help.
    fn should_retry(&self) -> bool {
        !self.is_success() && !TERMINAL_STATUS_CODES.contains(self)
    }
}

impl RetryExt for ErrorKind {
    fn should_retry(&self) -> bool {
        match self {
            // Any transport failure, from connect to the last byte of the body
            Self::Timeout(_) | Self::Network(_) => true,
            Self::RejectedStatusCode { status, .. } => status.should_retry(),
            _ => false,
        }
    }
}
