use http::{HeaderMap, Method};
use serde_json::Value;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Per-call settings of [`crate::ApiClient::request`]
///
/// Unset fields fall back to the defaults of the client.
///
/// ```
/// use http::Method;
/// use portal_lib::RequestOptions;
/// use serde_json::json;
///
/// let options = RequestOptions::builder()
///     .method(Method::POST)
///     .body(json!({"title": "Dean's list"}))
///     .build();
/// assert!(!options.is_cacheable());
/// ```
#[derive(TypedBuilder, Debug, Clone, PartialEq)]
#[builder(field_defaults(default, setter(into)))]
pub struct RequestOptions {
    /// HTTP method
    #[builder(default = Method::GET)]
    pub method: Method,

    /// Headers that override the client defaults for this call
    pub headers: HeaderMap,

    /// JSON request body
    pub body: Option<Value>,

    /// Whether a GET may be served from and stored in the cache
    #[builder(default = true)]
    pub cache: bool,

    /// Lifetime of the cached response, instead of the cache default
    pub cache_ttl: Option<Duration>,

    /// Number of attempts, instead of the client default
    pub retry_attempts: Option<u32>,

    /// Base delay between attempts, instead of the client default
    pub retry_delay: Option<Duration>,

    /// Timeout of a single attempt, instead of the client default
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RequestOptions {
    /// Returns `true` if the response may come from or go into the cache
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cache && self.method == Method::GET
    }
}

/// One entry of [`crate::ApiClient::batch_requests`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Endpoint, relative to the base URL or absolute
    pub endpoint: String,
    /// Per-call settings
    pub options: RequestOptions,
}

impl BatchRequest {
    /// A GET of `endpoint` with default options
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            options: RequestOptions::default(),
        }
    }

    /// Replace the options of this request
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<&str> for BatchRequest {
    fn from(endpoint: &str) -> Self {
        Self::new(endpoint)
    }
}
