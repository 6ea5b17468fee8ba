use futures::StreamExt;
use reqwest::header::ACCEPT;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::util::{validate_url, HostPolicy};

/// Errors that can occur while fetching a remote document.
///
/// There is no retry layer: each variant is a terminal outcome for the
/// attempt that produced it.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed validation (unparseable, bad scheme, private host)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// What kind of document a request expects, which selects the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Feed,
    Html,
    RobotsTxt,
}

impl Accept {
    pub fn header_value(self) -> &'static str {
        match self {
            Accept::Feed => {
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.1"
            }
            Accept::Html => {
                "text/html, application/xhtml+xml;q=0.9, application/rss+xml;q=0.8, application/atom+xml;q=0.8, */*;q=0.1"
            }
            Accept::RobotsTxt => "text/plain, */*;q=0.1",
        }
    }
}

/// Shared outbound HTTP layer.
///
/// Cloning is cheap: `reqwest::Client` is reference counted internally, so
/// the classifier, robots checker and locator each hold their own handle to
/// the same connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
    host_policy: HostPolicy,
}

impl Fetcher {
    /// Builds a client carrying the configured User-Agent.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Wraps a caller-configured client. The caller is responsible for the User-Agent.
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            timeout: config.request_timeout(),
            max_body_bytes: config.max_response_bytes,
            host_policy: config.host_policy(),
        }
    }

    pub fn host_policy(&self) -> HostPolicy {
        self.host_policy
    }

    /// GETs `url` and returns the full body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - rejected before any request is made
    /// - [`FetchError::Timeout`] - no response within the configured timeout
    /// - [`FetchError::Network`] - connection, DNS or TLS failure
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] - body problems
    pub async fn get(&self, url: &str, accept: Accept) -> Result<Vec<u8>, FetchError> {
        let url = validate_url(url, self.host_policy)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let request = self
            .client
            .get(url.as_str())
            .header(ACCEPT, accept.header_value());

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_body_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
