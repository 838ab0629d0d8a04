use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Failure reported by a [`Backend`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend rejected or failed a query
    #[error("{message}")]
    Query {
        /// Message reported by the backend
        message: String,
        /// Status reported by the backend, if any
        status: Option<u16>,
        /// Error code reported by the backend, if any
        code: Option<String>,
    },

    /// Anything else, e.g. a dropped connection
    #[error("{0}")]
    Unexpected(String),
}

/// The managed backend that owns persistence and authentication.
///
/// The client only needs to know who is signed in, so that requests are
/// rate limited per user instead of globally.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use portal_lib::{Backend, BackendError};
///
/// #[derive(Debug)]
/// struct Session(Option<String>);
///
/// #[async_trait]
/// impl Backend for Session {
///     async fn current_user_id(&self) -> Result<Option<String>, BackendError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait Backend: Debug + Send + Sync {
    /// Id of the signed-in user, `None` if nobody is signed in
    async fn current_user_id(&self) -> Result<Option<String>, BackendError>;
}
