//! HTTP GET seam used by every collector.
//!
//! Collectors only ever need "GET this URL and give me the body", so they
//! depend on the [`Fetch`] trait instead of a concrete client. [`HttpFetcher`]
//! is the `reqwest` implementation used in production; tests substitute an
//! in-memory stub from [`testing`].
//!
//! Every request carries the per-request timeout configured on the client,
//! so one hung source cannot stall the whole run. Transient failures
//! (connect/timeout errors, HTTP 5xx and 429) are retried with
//! [`Backoff`](crate::retry::Backoff).

use crate::config::HttpSettings;
use crate::retry::Backoff;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Why a GET produced no usable body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or no response arrived (DNS, connect,
    /// TLS, timeout).
    #[error("request to {url} failed: {source}")]
    Request {
        /// URL as requested.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// URL as requested.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response started but its body could not be read or decoded.
    /// Carries the URL and the underlying message.
    #[error("unusable response body: {0}")]
    Body(String),
}

impl FetchError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// # Returns
    ///
    /// `true` for connect errors, timeouts, HTTP 429 and HTTP 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Body(_) => false,
        }
    }
}

/// Plain HTTP GET returning the response body as text.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url`, sending `headers` in addition to the client defaults.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to GET.
    /// * `headers` - Extra `(name, value)` pairs, e.g. `Accept` or a browser
    ///   `User-Agent`.
    ///
    /// # Returns
    ///
    /// The body of a 2xx response, or the [`FetchError`] of the last attempt.
    async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError>;
}

/// `reqwest`-backed [`Fetch`] with a per-request timeout and retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// Shared client; also handed to the notifier.
    client: Client,
    /// Retry schedule for transient failures.
    backoff: Backoff,
}

impl HttpFetcher {
    /// Build the client from the `http` config section.
    ///
    /// # Arguments
    ///
    /// * `settings` - User agent, timeout and retry count.
    ///
    /// # Returns
    ///
    /// The fetcher, or the `reqwest` error if the TLS backend cannot start.
    pub fn new(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.timeout_secs.min(10)))
            .build()?;

        Ok(Self {
            client,
            backoff: Backoff::new(
                settings.max_retries,
                Duration::from_millis(500),
                Duration::from_secs(8),
            ),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn get_once(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| body_error(url, &e))?;
        debug!(bytes = body.len(), "Fetched");
        Ok(body)
    }
}

fn body_error(url: &str, e: &reqwest::Error) -> FetchError {
    FetchError::Body(format!("{url}: {e}"))
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        self.backoff
            .retry(url, FetchError::is_transient, || self.get_once(url, headers))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;

    #[test]
    fn test_status_transience() {
        let status = |status| FetchError::Status {
            url: "https://example.com".to_string(),
            status,
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!FetchError::Body("bad".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_body_error_names_the_url_and_is_final() {
        let cause = Client::new().get("not a url").send().await.unwrap_err();
        let err = body_error("https://a.test/feed", &cause);
        assert!(matches!(&err, FetchError::Body(message) if message.starts_with("https://a.test/feed: ")));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_http_fetcher_builds_from_settings() {
        assert!(HttpFetcher::new(&HttpSettings::default()).is_ok());
    }

    #[tokio::test]
    async fn test_stub_fetcher_routes() {
        let stub = StubFetcher::new()
            .with("https://a.test/", "hello")
            .with_status("https://b.test/", 500);

        assert_eq!(stub.get_text("https://a.test/", &[]).await.unwrap(), "hello");
        assert!(matches!(
            stub.get_text("https://b.test/", &[]).await,
            Err(FetchError::Status { status: 500, .. })
        ));
        assert!(matches!(
            stub.get_text("https://c.test/", &[]).await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(stub.requests().len(), 3);
    }
}
