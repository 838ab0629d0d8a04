#![allow(unreachable_pub)]

mod error;
mod response;

pub use error::{
    ErrorKind, INTERNAL_ERROR, INVALID_REQUEST, NETWORK_ERROR, RATE_LIMIT_EXCEEDED, TIMEOUT,
};
pub use response::{ApiError, ApiResponse, ResponseBody};

/// The portal `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
