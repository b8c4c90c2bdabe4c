//! Transport abstraction and the named provider that hands transports out.
//!
//! The downloader only needs "GET this URL and give me a status, an optional
//! length and a byte stream". [`Transport`] is that seam; [`HttpClient`]
//! is the reqwest-backed implementation and tests plug in their own.
//!
//! A [`TransportProvider`] owns transport lifecycle and caches one transport
//! per logical name, so every item of a batch shares one connection pool.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncRead;
use tracing::debug;
use url::Url;

use super::client::{ClientSettings, HttpClient};
use super::error::DownloadError;

/// Response body as a byte reader.
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// Headers-received response: status, announced length and the body stream.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Length` when the server announced one.
    pub content_length: Option<u64>,
    /// Body bytes, read incrementally.
    pub body: BodyReader,
}

impl TransportResponse {
    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Performs the GET for one item. Implementations must be safe to share
/// across concurrently running items.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a GET for `url` and returns once headers are received.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] or [`DownloadError::Timeout`] when
    /// no response could be obtained.
    async fn get(&self, url: &Url) -> Result<TransportResponse, DownloadError>;
}

/// Supplies ready-to-use transports keyed by a logical name.
pub trait TransportProvider: Send + Sync {
    /// Returns the transport registered under `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] when a transport cannot be built.
    fn transport(&self, name: &str) -> Result<Arc<dyn Transport>, DownloadError>;
}

/// Lazily built, name-keyed cache of [`HttpClient`]s.
#[derive(Debug, Default)]
pub struct HttpClientPool {
    settings: ClientSettings,
    clients: DashMap<String, Arc<HttpClient>>,
}

impl HttpClientPool {
    /// Creates an empty pool that builds clients from `settings`.
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            clients: DashMap::new(),
        }
    }

    /// Registers a pre-built client under `name`, replacing any previous one.
    pub fn insert(&self, name: impl Into<String>, client: HttpClient) {
        self.clients.insert(name.into(), Arc::new(client));
    }

    /// Number of distinct clients built or registered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true when no client has been built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn client(&self, name: &str) -> Result<Arc<HttpClient>, DownloadError> {
        if let Some(existing) = self.clients.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        let built = Arc::new(HttpClient::with_settings(&self.settings)?);
        debug!(name, "built HTTP client");
        // A racing caller may have inserted first; keep whichever landed.
        let entry = self.clients.entry(name.to_string()).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }
}

impl TransportProvider for HttpClientPool {
    fn transport(&self, name: &str) -> Result<Arc<dyn Transport>, DownloadError> {
        let client: Arc<dyn Transport> = self.client(name)?;
        Ok(client)
    }
}

/// Provider that hands out one injected transport regardless of name.
#[derive(Clone)]
pub struct StaticTransport {
    transport: Arc<dyn Transport>,
}

impl StaticTransport {
    /// Wraps `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl fmt::Debug for StaticTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTransport").finish_non_exhaustive()
    }
}

impl TransportProvider for StaticTransport {
    fn transport(&self, _name: &str) -> Result<Arc<dyn Transport>, DownloadError> {
        Ok(Arc::clone(&self.transport))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct EmptyTransport;

    #[async_trait]
    impl Transport for EmptyTransport {
        async fn get(&self, _url: &Url) -> Result<TransportResponse, DownloadError> {
            Ok(TransportResponse {
                status: 204,
                content_length: Some(0),
                body: Box::pin(tokio::io::empty()),
            })
        }
    }

    #[test]
    fn test_pool_reuses_client_per_name() {
        let pool = HttpClientPool::default();
        let first = pool.client("default").unwrap();
        let second = pool.client("default").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_builds_separate_clients_per_name() {
        let pool = HttpClientPool::default();
        let a = pool.client("a").unwrap();
        let b = pool.client("b").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_insert_registers_prebuilt_client() {
        let pool = HttpClientPool::default();
        pool.insert("mirror", HttpClient::new());
        assert_eq!(pool.len(), 1);

        let registered = Arc::clone(pool.clients.get("mirror").unwrap().value());
        let served = pool.client("mirror").unwrap();
        assert!(Arc::ptr_eq(&registered, &served));
        assert_eq!(pool.len(), 1, "a registered name must not be rebuilt");

        pool.transport("default").unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_static_transport_ignores_name() {
        let provider = StaticTransport::new(Arc::new(EmptyTransport));
        let url = Url::parse("https://example.com/").unwrap();

        let response = provider.transport("anything").unwrap().get(&url).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.content_length, Some(0));
    }

    #[test]
    fn test_response_success_range() {
        let make = |status| TransportResponse {
            status,
            content_length: None,
            body: Box::pin(tokio::io::empty()),
        };
        assert!(make(200).is_success());
        assert!(make(299).is_success());
        assert!(!make(304).is_success());
        assert!(!make(404).is_success());
    }
}
