//! Resilient access to the portal API.
//!
//! This module defines two structs, [`ApiClient`] and [`ClientBuilder`].
//! `ApiClient` sends requests and wraps their outcome in an
//! [`ApiResponse`]. On the way it serves GETs from the cache, enforces the
//! per-user rate limits, retries transient failures with exponential backoff
//! and bounds every attempt with a timeout. `ClientBuilder` exposes a finer
//! level of granularity for building an `ApiClient`.
#![allow(clippy::module_name_repetitions)]

mod backend;
mod cache_key;
mod config;
mod options;

pub use backend::{Backend, BackendError};
pub use config::ClientConfig;
pub use options::{BatchRequest, RequestOptions};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use typed_builder::TypedBuilder;
use url::Url;

use crate::cache::{Cache, CacheConfig};
use crate::clock::system_clock;
use crate::ratelimit::{Identity, RateLimiters};
use crate::retry::RetryExt;
use crate::security::add_security_headers;
use crate::{ApiResponse, ErrorKind, Result};
use cache_key::cache_key;

/// Default timeout of a single attempt, 10 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of attempts per request, 3.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default delay before the first retry, 1 second.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default number of requests a batch runs at once, 5.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;
/// Default user agent, `portal/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("portal/", env!("CARGO_PKG_VERSION"));

// Constants currently not configurable by the user.
/// A timeout for only the connect phase of a Client.
const CONNECT_TIMEOUT: u64 = 10;
/// TCP keepalive
/// See <https://tldp.org/HOWTO/TCP-Keepalive-HOWTO/overview.html> for more info
const TCP_KEEPALIVE: u64 = 60;
/// Upper bound for asking the backend who is signed in
const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for [`ApiClient`].
///
/// ```
/// use portal_lib::ClientBuilder;
/// use std::time::Duration;
/// use url::Url;
///
/// # fn main() -> portal_lib::Result<()> {
/// let client = ClientBuilder::builder()
///     .base_url(Url::parse("https://api.example.edu/v1").unwrap())
///     .timeout(Duration::from_secs(5))
///     .build()
///     .client()?;
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// URL that relative endpoints are resolved against.
    ///
    /// Without it, every endpoint must be an absolute URL.
    base_url: Option<Url>,

    /// Sets the default [headers] for every request.
    ///
    /// Per-call headers in [`RequestOptions::headers`] take precedence.
    ///
    /// [headers]: https://docs.rs/http/latest/http/header/struct.HeaderName.html
    custom_headers: HeaderMap,

    /// User-agent sent with every request.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Timeout of a single attempt.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,

    /// Attempts per request, including the first one.
    ///
    /// Zero is treated as one.
    #[builder(default = DEFAULT_RETRY_ATTEMPTS)]
    retry_attempts: u32,

    /// Delay before the first retry.
    ///
    /// The delay doubles for every further retry.
    #[builder(default = DEFAULT_RETRY_DELAY)]
    retry_delay: Duration,

    /// When `true`, send the hardening headers of [`crate::security`].
    #[builder(default = true)]
    security_headers: bool,

    /// Rate limiters shared with other clients.
    ///
    /// Defaults to a fresh pair with the standard quotas.
    limiters: Option<RateLimiters>,

    /// Response cache shared with other clients.
    ///
    /// Defaults to a fresh cache with the API response profile.
    cache: Option<Arc<Cache<ApiResponse<Value>>>>,

    /// Backend used to find out who is signed in.
    ///
    /// Without it every request counts against the anonymous quota.
    backend: Option<Arc<dyn Backend>>,
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates an [`ApiClient`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<ApiClient> {
        let Self {
            base_url,
            custom_headers: mut headers,
            user_agent,
            timeout,
            retry_attempts,
            retry_delay,
            security_headers,
            limiters,
            cache,
            backend,
        } = self;

        if security_headers {
            add_security_headers(&mut headers);
        }
        headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);

        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE))
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        let cache = cache.unwrap_or_else(|| {
            Arc::new(Cache::from_valid(
                CacheConfig::api_responses(),
                system_clock(),
            ))
        });

        Ok(ApiClient {
            reqwest_client,
            base_url,
            timeout,
            retry_attempts: retry_attempts.max(1),
            retry_delay,
            limiters: limiters.unwrap_or_default(),
            cache,
            backend,
        })
    }
}

/// Sends requests to the portal API.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP request client.
    ///
    /// [reqwest]: https://docs.rs/reqwest/latest/reqwest/struct.Client.html
    reqwest_client: reqwest::Client,

    /// URL that relative endpoints are resolved against.
    base_url: Option<Url>,

    /// Default timeout of a single attempt.
    timeout: Duration,

    /// Default number of attempts per request.
    retry_attempts: u32,

    /// Default delay before the first retry.
    retry_delay: Duration,

    /// Per-user quotas.
    limiters: RateLimiters,

    /// Cache of successful GET responses.
    cache: Arc<Cache<ApiResponse<Value>>>,

    /// Source of the current user.
    backend: Option<Arc<dyn Backend>>,
}

impl ApiClient {
    /// Rate limiters this client enforces
    #[must_use]
    pub const fn limiters(&self) -> &RateLimiters {
        &self.limiters
    }

    /// Cache this client serves GETs from
    #[must_use]
    pub const fn cache(&self) -> &Arc<Cache<ApiResponse<Value>>> {
        &self.cache
    }

    /// Send a request and decode the payload into `T`.
    ///
    /// A failed request yields an `Err`; use [`ApiResponse::from_error`] to
    /// report it in-band.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::RateLimitExceeded`] if the caller's quota is used up.
    ///   No request is sent in that case.
    /// - [`ErrorKind::RejectedStatusCode`] if the server answered with a
    ///   non-success status on the last attempt.
    /// - [`ErrorKind::Timeout`] or [`ErrorKind::Network`] if the last
    ///   attempt did not get an answer.
    /// - [`ErrorKind::InvalidResponseBody`] if a success body is not JSON.
    /// - [`ErrorKind::Serialization`] if the payload does not fit `T`.
    /// - [`ErrorKind::InvalidUrl`] if the endpoint cannot be resolved.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        let response = self.request_json(endpoint, options).await?;
        Ok(response.try_map(serde_json::from_value)?)
    }

    /// Send a request and keep the payload as raw JSON.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn request_json(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<Value>> {
        let cacheable = options.is_cacheable();
        let key = cache_key(&options.method, endpoint, options.body.as_ref());

        if cacheable && let Some(response) = self.cache.get(&key) {
            return Ok(response.into_cached());
        }

        let url = self.resolve(endpoint)?;
        let identity = self.identity().await;
        let limiter = self.limiters.for_endpoint(endpoint);

        if !limiter.is_allowed(&identity) {
            return Err(ErrorKind::RateLimitExceeded {
                retry_after: limiter.time_until_reset(&identity),
            });
        }

        let (status, data) = self.execute_with_retry(&url, &options).await?;
        let response = ApiResponse::success(status.as_u16(), data);

        if cacheable && !status.is_client_error() && !status.is_server_error() {
            self.cache.set(key, response.clone(), options.cache_ttl);
        }

        let reset_time = SystemTime::now().checked_add(limiter.time_until_reset(&identity));
        Ok(response.with_quota(limiter.remaining_tokens(&identity), reset_time))
    }

    /// GET `endpoint`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>> {
        self.request(endpoint, RequestOptions::default()).await
    }

    /// POST `body` to `endpoint`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<ApiResponse<T>> {
        self.request(endpoint, with_body(Method::POST, body)).await
    }

    /// PUT `body` to `endpoint`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<ApiResponse<T>> {
        self.request(endpoint, with_body(Method::PUT, body)).await
    }

    /// PATCH `endpoint` with `body`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn patch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<ApiResponse<T>> {
        self.request(endpoint, with_body(Method::PATCH, body)).await
    }

    /// DELETE `endpoint`
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>> {
        let options = RequestOptions::builder().method(Method::DELETE).build();
        self.request(endpoint, options).await
    }

    /// Run a query against the backend and wrap its outcome.
    ///
    /// # Errors
    ///
    /// [`BackendError::Query`] becomes [`ErrorKind::Backend`] and
    /// [`BackendError::Unexpected`] becomes [`ErrorKind::Internal`].
    pub async fn backend_query<T, F>(&self, operation: F) -> Result<ApiResponse<T>>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        match operation.await {
            Ok(data) => Ok(ApiResponse::success(StatusCode::OK.as_u16(), data)),
            Err(e) => {
                log::debug!("Backend query failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Send many requests, `concurrency` at a time.
    ///
    /// Requests run in consecutive chunks: every request of a chunk runs
    /// concurrently, and the next chunk starts once the whole chunk is done.
    /// Failures are reported in-band, so the output has one response per
    /// request, in input order. A `concurrency` of zero is treated as one.
    pub async fn batch_requests(
        &self,
        requests: impl IntoIterator<Item = BatchRequest>,
        concurrency: usize,
    ) -> Vec<ApiResponse<Value>> {
        let requests: Vec<_> = requests.into_iter().collect();
        let mut responses = Vec::with_capacity(requests.len());

        for chunk in requests.chunks(concurrency.max(1)) {
            let chunk = chunk
                .iter()
                .map(|request| self.request_json(&request.endpoint, request.options.clone()));
            responses.extend(
                join_all(chunk)
                    .await
                    .into_iter()
                    .map(|result| result.unwrap_or_else(|e| ApiResponse::from_error(&e))),
            );
        }

        responses
    }

    /// Turn `endpoint` into an absolute URL.
    ///
    /// Absolute endpoints are used as they are. Relative ones are appended
    /// to the base URL with exactly one `/` in between.
    fn resolve(&self, endpoint: &str) -> Result<Url> {
        match (Url::parse(endpoint), &self.base_url) {
            (Ok(url), _) => Ok(url),
            (Err(_), Some(base)) => {
                let joined = format!(
                    "{}/{}",
                    base.as_str().trim_end_matches('/'),
                    endpoint.trim_start_matches('/')
                );
                Url::parse(&joined).map_err(|e| ErrorKind::InvalidUrl(endpoint.to_string(), e))
            }
            (Err(e), None) => Err(ErrorKind::InvalidUrl(endpoint.to_string(), e)),
        }
    }

    /// Who the current request is accounted to.
    ///
    /// Never fails: anything but a known user id yields the anonymous identity.
    async fn identity(&self) -> Identity {
        let Some(backend) = &self.backend else {
            return Identity::anonymous();
        };

        match tokio::time::timeout(IDENTITY_TIMEOUT, backend.current_user_id()).await {
            Ok(Ok(Some(id))) => Identity::from(id),
            Ok(Ok(None)) => Identity::anonymous(),
            Ok(Err(e)) => {
                log::debug!("Cannot resolve current user, continuing anonymously: {e}");
                Identity::anonymous()
            }
            Err(_) => {
                log::debug!("Resolving the current user timed out, continuing anonymously");
                Identity::anonymous()
            }
        }
    }

    /// Send the request until it succeeds, fails terminally or runs out of
    /// attempts. The last error is returned.
    async fn execute_with_retry(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<(StatusCode, Value)> {
        let attempts = options.retry_attempts.unwrap_or(self.retry_attempts).max(1);
        let retry_delay = options.retry_delay.unwrap_or(self.retry_delay);
        let timeout = options.timeout.unwrap_or(self.timeout);

        let mut attempt = 1;
        loop {
            match self.execute(url, options, timeout).await {
                Ok(success) => return Ok(success),
                Err(e) if attempt < attempts && e.should_retry() => {
                    let wait = backoff(retry_delay, attempt);
                    log::debug!(
                        "Attempt {attempt}/{attempts} of {} {url} failed: {e}. Retrying in {}ms",
                        options.method,
                        wait.as_millis()
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// A single attempt, raced against `timeout`
    async fn execute(
        &self,
        url: &Url,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<(StatusCode, Value)> {
        let mut request = self
            .reqwest_client
            .request(options.method.clone(), url.clone())
            .headers(options.headers.clone());
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let send = async {
            let response = request.send().await.map_err(ErrorKind::Network)?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(ErrorKind::Network)?;
            Ok::<_, ErrorKind>((status, bytes))
        };

        let (status, bytes) = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| ErrorKind::Timeout(timeout))??;

        if !status.is_success() {
            return Err(rejected(status, &bytes));
        }

        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|source| ErrorKind::InvalidResponseBody { status, source })?
        };
        Ok((status, data))
    }
}

/// Options for a request that carries `body`
fn with_body(method: Method, body: Value) -> RequestOptions {
    RequestOptions::builder().method(method).body(body).build()
}

/// Wait before retry number `attempt`: `retry_delay * 2^(attempt - 1)`
fn backoff(retry_delay: Duration, attempt: u32) -> Duration {
    retry_delay.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Error for a non-success answer, with `message` and `code` taken from a
/// JSON error body if the server sent one
fn rejected(status: StatusCode, body: &[u8]) -> ErrorKind {
    let payload: Option<Value> = serde_json::from_slice(body).ok();
    let field = |name: &str| {
        payload
            .as_ref()
            .and_then(|payload| payload.get(name))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    };

    ErrorKind::RejectedStatusCode {
        status,
        message: field("message")
            .or_else(|| field("error"))
            .unwrap_or_else(|| format!("HTTP {status}")),
        code: field("code"),
    }
}
