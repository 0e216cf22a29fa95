//! HTTP page fetcher.
//!
//! This module provides the [`PageFetcher`] capability trait and its
//! reqwest-backed implementation [`HttpFetcher`]. A fetcher issues exactly one
//! network request per call and classifies nothing; retry decisions live in
//! [`crate::fetch::retry`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument};

use super::error::FetchError;

/// User-Agent identifying the tool to the catalog source.
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; BooksScraper/1.0; Educational)";

/// Default connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default request timeout (10 seconds). Listing pages are small HTML bodies.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// One successfully fetched page.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// The URL the page was fetched from.
    pub url: String,
    /// The HTML body.
    pub body: String,
}

/// Narrow fetch capability: one request in, one page or one error out.
///
/// The pagination walker and the retry loop are written against this trait so
/// they can be exercised with an in-memory fake that never touches the
/// network.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a single page.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing the network, timeout, HTTP status,
    /// or URL problem. Exactly one request is issued; no retries happen here.
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError>;
}

/// reqwest-backed [`PageFetcher`] with timeouts and connection pooling.
///
/// Create once and reuse across the whole run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Creates a fetcher with the default 10 second timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a fetcher with an explicit per-request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied timeout.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
        if url::Url::parse(url).is_err() {
            return Err(FetchError::invalid_url(url));
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            return Err(FetchError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        debug!(url, bytes = body.len(), "fetched page");
        Ok(RawPage {
            url: url.to_string(),
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_builds_with_defaults() {
        let fetcher = HttpFetcher::new();
        assert!(format!("{fetcher:?}").contains("Client"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_url_without_request() {
        let fetcher = HttpFetcher::new();
        let result = fetcher.fetch("not a url at all").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }
}
