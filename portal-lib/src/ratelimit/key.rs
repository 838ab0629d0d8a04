use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier used by callers who are not signed in
pub const ANONYMOUS: &str = "anonymous";

/// The caller a rate-limit bucket belongs to.
///
/// This is the authenticated user id when the backend knows one, and
/// [`ANONYMOUS`] otherwise. Ids are compared verbatim.
///
/// # Examples
///
/// ```
/// use portal_lib::ratelimit::Identity;
///
/// assert_eq!(Identity::anonymous().as_str(), "anonymous");
/// assert_eq!(Identity::from("user-42").as_str(), "user-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// The shared identity of everybody who is not signed in
    #[must_use]
    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    /// Returns `true` if this is the anonymous identity
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Identity(id)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Identity(id.to_string())
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}
