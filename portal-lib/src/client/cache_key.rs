use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::Method;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Characters of the body digest kept in a key
const DIGEST_LEN: usize = 16;

/// Placeholder digest of a request without body
const NO_BODY: &str = "-";

/// Cache key of a request: `{METHOD}:{endpoint}:{digest}`.
///
/// The digest is a prefix of the URL-safe base64 SHA-256 of the compact
/// JSON body, so keys stay short no matter how large the body is.
pub(crate) fn cache_key(method: &Method, endpoint: &str, body: Option<&Value>) -> String {
    let digest = body.map_or_else(|| NO_BODY.to_string(), body_digest);
    format!("{method}:{endpoint}:{digest}")
}

fn body_digest(body: &Value) -> String {
    let hash = Sha256::digest(body.to_string().as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(hash);
    encoded.truncate(DIGEST_LEN);
    encoded
}
