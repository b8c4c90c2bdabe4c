//! HTTP client wrapper used as the default transport.
//!
//! This module provides the `HttpClient` struct which sends GET requests with
//! proper timeout configuration and exposes the response body as a stream.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::Client;
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::transport::{Transport, TransportResponse};
use crate::user_agent;

/// Settings used to build an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout, body included.
    pub read_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            user_agent: user_agent::default_user_agent(),
        }
    }
}

impl ClientSettings {
    /// Default settings with explicit timeouts in seconds.
    #[must_use]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            read_timeout: Duration::from_secs(read_timeout_secs),
            ..Self::default()
        }
    }
}

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and reused for multiple downloads,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use bulkfetch_core::download::{HttpClient, Transport};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let response = client.get(&Url::parse("https://example.com/file.pdf")?).await?;
/// println!("status {}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_settings(&ClientSettings::default())
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a new HTTP client from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if reqwest rejects the
    /// configuration (for example, a TLS backend cannot be initialized).
    #[instrument(level = "debug", skip(settings), fields(user_agent = %settings.user_agent))]
    pub fn with_settings(settings: &ClientSettings) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .gzip(true)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn get(&self, url: &Url) -> Result<TransportResponse, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url.as_str(), e))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(status, ?content_length, "response headers received");

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(TransportResponse {
            status,
            content_length,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}
