//! HTTP client construction and automatic retries
//!
//! One `reqwest::Client` is shared by every fetch of a crawl (and by every
//! crawl of a batch) so connections are pooled. Transient failures are
//! retried with exponential backoff:
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 429 | Retry |
//! | HTTP 500, 502, 503, 504 | Retry |
//! | Connection error | Retry |
//! | Timeout | Retry |
//! | Any other status | Returned to the caller |
//! | Any other error | Returned to the caller |

use crate::config::{Config, RetryConfig};
use crate::MirrorError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

/// Status codes worth another attempt
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Builds the HTTP client shared by all fetches
///
/// # Example
///
/// ```
/// use asset_mirror::config::Config;
/// use asset_mirror::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.value.clone())
        .timeout(config.crawler.request_timeout())
        .connect_timeout(config.crawler.request_timeout())
        .pool_max_idle_per_host(config.crawler.concurrency)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Retry schedule for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.backoff_base))
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Pause before retry number `retry` (zero-based): `base * 2^retry`
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_connect() || error.is_timeout()
    }

    /// Sends the request produced by `build`, retrying transient failures
    ///
    /// `build` is called once per attempt. After the last retry the final
    /// response is returned whatever its status, so callers still inspect
    /// [`Response::status`].
    pub async fn send<F>(&self, url: &Url, build: F) -> Result<Response, MirrorError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retry = 0;

        loop {
            let attempt = build().send().await;
            let exhausted = retry >= self.max_retries;

            match attempt {
                Ok(response) => {
                    if exhausted || !Self::is_retryable_status(response.status()) {
                        return Ok(response);
                    }
                    tracing::debug!(
                        url = %url,
                        status = response.status().as_u16(),
                        retry = retry + 1,
                        "transient status, retrying"
                    );
                }
                Err(e) => {
                    if exhausted || !Self::is_retryable_error(&e) {
                        return Err(MirrorError::Http {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    tracing::debug!(
                        url = %url,
                        error = %e,
                        retry = retry + 1,
                        "transient network error, retrying"
                    );
                }
            }

            tokio::time::sleep(self.delay_for(retry)).await;
            retry += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
