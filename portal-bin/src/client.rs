use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use http::HeaderMap;
use portal_lib::{ApiClient, Caches, ClientBuilder, DEFAULT_USER_AGENT, RateLimiters, clock::system_clock};

/// Services shared by every request of a run
#[derive(Debug, Clone)]
pub(crate) struct Services {
    pub(crate) limiters: RateLimiters,
    pub(crate) caches: Caches,
}

impl Services {
    /// Create the limiters and caches from the `[rate_limits]` and
    /// `[caches]` sections
    pub(crate) fn create(cfg: &Config) -> Result<Self> {
        let clock = system_clock();
        let limiters =
            RateLimiters::new(&cfg.rate_limits, clock.clone()).context("Invalid rate limits")?;
        let caches = Caches::new(&cfg.caches, clock).context("Invalid cache configuration")?;
        Ok(Self { limiters, caches })
    }
}

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config, services: &Services) -> Result<ApiClient> {
    let client = cfg.client_config();
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    ClientBuilder::builder()
        .base_url(cfg.base_url.clone())
        .custom_headers(headers)
        .user_agent(
            client
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        )
        .timeout(client.timeout)
        .retry_attempts(client.retry_attempts)
        .retry_delay(client.retry_delay)
        .security_headers(client.security_headers)
        .limiters(services.limiters.clone())
        .cache(services.caches.api_responses.clone())
        .build()
        .client()
        .context("Failed to create request client")
}
