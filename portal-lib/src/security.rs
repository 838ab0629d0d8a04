//! Hardening headers sent with every request.

use http::HeaderMap;
use http::header::{
    HeaderName, HeaderValue, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    X_XSS_PROTECTION,
};

/// Header name/value pairs added by [`add_security_headers`]
pub const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_FRAME_OPTIONS, "DENY"),
    (X_XSS_PROTECTION, "1; mode=block"),
    (REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

/// Add the security headers to `headers`.
///
/// Headers that are already present keep their value.
///
/// ```
/// use http::HeaderMap;
/// use http::header::X_FRAME_OPTIONS;
/// use portal_lib::security::add_security_headers;
///
/// let mut headers = HeaderMap::new();
/// headers.insert(X_FRAME_OPTIONS, "SAMEORIGIN".parse().unwrap());
/// add_security_headers(&mut headers);
///
/// assert_eq!(headers[X_FRAME_OPTIONS], "SAMEORIGIN");
/// assert_eq!(headers["x-content-type-options"], "nosniff");
/// ```
pub fn add_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(name)
            .or_insert(HeaderValue::from_static(value));
    }
}
