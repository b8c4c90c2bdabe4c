//! In-process transports for batch tests: no sockets, full control over
//! timing and failures.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bulkfetch_core::download::{BodyReader, DownloadError, Transport, TransportResponse};
use dashmap::DashMap;
use futures_util::stream;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;
use url::Url;

/// Counters shared between a transport and the bodies it hands out.
#[derive(Debug, Default)]
pub struct Gauge {
    started: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    /// Number of GETs issued so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open transfers.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Transfers open right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> InFlight {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(Arc::clone(self))
    }
}

/// Keeps a transfer counted as active until dropped.
struct InFlight(Arc<Gauge>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Body that holds its [`InFlight`] guard for as long as it is alive.
struct GuardedBody {
    inner: BodyReader,
    _in_flight: InFlight,
}

impl AsyncRead for GuardedBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

/// Body that yields `payload` after waiting `delay`.
fn delayed_body(payload: Vec<u8>, delay: Duration) -> BodyReader {
    let chunk = stream::once(async move {
        tokio::time::sleep(delay).await;
        Ok::<_, io::Error>(Cursor::new(payload))
    });
    Box::pin(StreamReader::new(chunk))
}

/// Serves the URL path as the body. Paths containing `fail` answer 500.
///
/// Every body is held back for `delay` so transfers overlap.
#[derive(Debug)]
pub struct InstrumentedTransport {
    gauge: Arc<Gauge>,
    delay: Duration,
}

impl InstrumentedTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            gauge: Arc::new(Gauge::default()),
            delay,
        }
    }

    pub fn gauge(&self) -> Arc<Gauge> {
        Arc::clone(&self.gauge)
    }
}

#[async_trait]
impl Transport for InstrumentedTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, DownloadError> {
        let in_flight = self.gauge.enter();
        let status = if url.path().contains("fail") { 500 } else { 200 };
        let payload = if status == 200 {
            url.path().as_bytes().to_vec()
        } else {
            Vec::new()
        };
        Ok(TransportResponse {
            status,
            content_length: Some(payload.len() as u64),
            body: Box::pin(GuardedBody {
                inner: delayed_body(payload, self.delay),
                _in_flight: in_flight,
            }),
        })
    }
}

/// Fails the first `failures` GETs of every URL with a connection error,
/// then serves the URL path.
#[derive(Debug)]
pub struct FlakyTransport {
    failures: usize,
    attempts: DashMap<String, usize>,
}

impl FlakyTransport {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: DashMap::new(),
        }
    }

    /// GETs seen for `url`.
    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.get(url).map_or(0, |n| *n)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, DownloadError> {
        let seen = {
            let mut entry = self.attempts.entry(url.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if seen <= self.failures {
            return Err(DownloadError::body(
                url.as_str(),
                io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"),
            ));
        }
        let payload = url.path().as_bytes().to_vec();
        Ok(TransportResponse {
            status: 200,
            content_length: Some(payload.len() as u64),
            body: delayed_body(payload, Duration::ZERO),
        })
    }
}
