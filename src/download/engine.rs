//! Download engine for single and bounded-concurrency batch downloads.
//!
//! This module provides the [`Fetcher`], which coordinates concurrent
//! downloads using a semaphore-based concurrency control pattern, with
//! optional retry on failures using exponential backoff.
//!
//! # Overview
//!
//! A batch spawns one task per URI, but only after a permit is available, so
//! at most `max_concurrent` transfers run at once and nothing beyond the
//! input list is ever queued. Workers report `(uri, outcome)` over a channel;
//! the calling task is the only one that touches the result collection.
//!
//! # Example
//!
//! ```no_run
//! use bulkfetch_core::download::Fetcher;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::default();
//! let uris = ["https://example.com/a.pdf", "https://example.com/b.pdf"];
//! let paths = fetcher
//!     .download_multiple(Path::new("./downloads"), &uris, 4, &CancellationToken::new())
//!     .await?;
//! println!("downloaded {} files", paths.len());
//! # Ok(())
//! # }
//! ```

mod report;
mod task;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::DEFAULT_TRANSPORT_NAME;
use super::error::{DownloadError, RequestError};
use super::outcome::{DownloadOutcome, FailureReason};
use super::request::{DownloadRequest, TargetSpec, parse_http_url};
use super::retry::{PolicyCache, RetryPolicy};
use super::transport::{HttpClientPool, StaticTransport, Transport, TransportProvider};

pub use report::{BatchReport, BatchStats, ItemFailure};
use task::{ItemResult, Worker, drain_finished_workers, join_workers, run_item};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Batch-level errors. Individual item failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The transport provider could not supply a transport for the batch.
    #[error("transport '{name}' unavailable: {source}")]
    TransportUnavailable {
        /// Logical transport name that was requested.
        name: String,
        /// Why the provider failed.
        #[source]
        source: DownloadError,
    },

    /// The batch was cancelled; `completed` holds the files written before that.
    #[error("batch cancelled after {} downloads completed", .completed.len())]
    Cancelled {
        /// Paths that were fully written before cancellation.
        completed: Vec<PathBuf>,
    },
}

/// Entry point for single and batch downloads.
///
/// A `Fetcher` owns a transport provider and a retry policy cache. It holds
/// no per-download state, so one instance can serve any number of
/// concurrent calls.
pub struct Fetcher {
    provider: Arc<dyn TransportProvider>,
    transport_name: String,
    policies: PolicyCache,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(Arc::new(HttpClientPool::default()))
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("transport_name", &self.transport_name)
            .field("cached_policies", &self.policies.len())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher that takes transports from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn TransportProvider>) -> Self {
        Self {
            provider,
            transport_name: DEFAULT_TRANSPORT_NAME.to_string(),
            policies: PolicyCache::new(),
        }
    }

    /// Creates a fetcher that always uses `transport`.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self::new(Arc::new(StaticTransport::new(transport)))
    }

    /// Selects which named transport the provider is asked for.
    #[must_use]
    pub fn with_transport_name(mut self, name: impl Into<String>) -> Self {
        self.transport_name = name.into();
        self
    }

    /// Returns the shared policy for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRetryPolicy`] for invalid settings.
    pub fn policy(
        &self,
        max_attempts: u32,
        base_delay_secs: f64,
    ) -> Result<Arc<RetryPolicy>, RequestError> {
        self.policies.get_or_create(max_attempts, base_delay_secs)
    }

    /// Downloads one request with a single attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] when the URI is invalid or no target can be
    /// resolved; no network I/O happens in that case. Transport and
    /// filesystem problems are reported through the returned outcome.
    #[instrument(skip(self, request, cancel), fields(uri = request.uri()))]
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, RequestError> {
        self.download_inner(request, None, cancel).await
    }

    /// Downloads one request through a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Same as [`Self::download`].
    #[instrument(skip(self, transport, request, cancel), fields(uri = request.uri()))]
    pub async fn download_with_transport(
        &self,
        transport: &dyn Transport,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, RequestError> {
        let (url, target) = validate(request)?;
        Ok(run_item(transport, &url, &target, None, cancel).await)
    }

    /// Downloads one request, retrying failures under `policy`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::download`].
    #[instrument(skip(self, request, policy, cancel), fields(uri = request.uri(), max_attempts = policy.max_attempts()))]
    pub async fn download_with_retry(
        &self,
        request: &DownloadRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, RequestError> {
        self.download_inner(request, Some(policy), cancel).await
    }

    /// Downloads one request with a retry policy built from raw settings.
    ///
    /// Policies are cached per `(max_attempts, base_delay_secs)`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRetryPolicy`] for invalid settings, and
    /// otherwise the same errors as [`Self::download`].
    pub async fn download_with_retry_config(
        &self,
        request: &DownloadRequest,
        max_attempts: u32,
        base_delay_secs: f64,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, RequestError> {
        let policy = self.policy(max_attempts, base_delay_secs)?;
        self.download_with_retry(request, &policy, cancel).await
    }

    async fn download_inner(
        &self,
        request: &DownloadRequest,
        policy: Option<&RetryPolicy>,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, RequestError> {
        let (url, target) = validate(request)?;
        let transport = match self.provider.transport(&self.transport_name) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(name = %self.transport_name, error = %e, "transport unavailable");
                return Ok(DownloadOutcome::failure(
                    FailureReason::Transport,
                    e.to_string(),
                ));
            }
        };
        Ok(run_item(transport.as_ref(), &url, &target, policy, cancel).await)
    }

    /// Downloads every URI into `directory` with at most `max_concurrent`
    /// transfers in flight, one attempt per item.
    ///
    /// Returns the paths of successful items in no particular order. Failed
    /// items are logged and left out.
    ///
    /// # Errors
    ///
    /// - [`BatchError::InvalidConcurrency`] if `max_concurrent` is outside 1..=100
    /// - [`BatchError::TransportUnavailable`] if no transport can be obtained
    /// - [`BatchError::Cancelled`] if `cancel` fired, carrying the finished paths
    pub async fn download_multiple<S: AsRef<str>>(
        &self,
        directory: &Path,
        uris: &[S],
        max_concurrent: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, BatchError> {
        let report = self
            .run_batch(directory, uris, max_concurrent, None, cancel)
            .await?;
        into_paths(report)
    }

    /// Same as [`Self::download_multiple`], with every item run under `policy`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::download_multiple`].
    pub async fn download_multiple_with_retry<S: AsRef<str>>(
        &self,
        directory: &Path,
        uris: &[S],
        max_concurrent: usize,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, BatchError> {
        let report = self
            .run_batch(directory, uris, max_concurrent, Some(policy), cancel)
            .await?;
        into_paths(report)
    }

    /// Runs a batch and returns the full report, including failures.
    ///
    /// Unlike [`Self::download_multiple`], a cancelled batch is still an `Ok`
    /// report with `cancelled` set, so callers can show partial progress.
    ///
    /// # Errors
    ///
    /// - [`BatchError::InvalidConcurrency`] if `max_concurrent` is outside 1..=100
    /// - [`BatchError::TransportUnavailable`] if no transport can be obtained
    #[instrument(skip(self, directory, uris, policy, cancel), fields(directory = %directory.display(), count = uris.len()))]
    pub async fn run_batch<S: AsRef<str>>(
        &self,
        directory: &Path,
        uris: &[S],
        max_concurrent: usize,
        policy: Option<&RetryPolicy>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        if uris.is_empty() {
            debug!("empty batch");
            return Ok(BatchReport::new(0));
        }

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&max_concurrent) {
            return Err(BatchError::InvalidConcurrency {
                value: max_concurrent,
            });
        }

        let transport = self
            .provider
            .transport(&self.transport_name)
            .map_err(|source| BatchError::TransportUnavailable {
                name: self.transport_name.clone(),
                source,
            })?;

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let batch_cancel = cancel.child_token();
        let policy = policy.map(|p| Arc::new(p.clone()));
        let target = TargetSpec::Derived {
            directory: directory.to_path_buf(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<ItemResult>();
        let mut report = BatchReport::new(uris.len());
        let mut workers: Vec<Worker> = Vec::with_capacity(max_concurrent);
        let mut started = 0;

        for (index, raw) in uris.iter().enumerate() {
            drain_finished_workers(&mut workers, &mut rx, &mut report).await;
            if batch_cancel.is_cancelled() {
                break;
            }
            started = index + 1;

            let uri = raw.as_ref().to_string();
            let url = match parse_http_url(&uri) {
                Ok(url) => url,
                Err(e) => {
                    report.record(
                        uri,
                        DownloadOutcome::failure(FailureReason::InvalidRequest, e.to_string()),
                    );
                    continue;
                }
            };

            // Acquire semaphore permit, but race against cancellation so a
            // cancel during a full-concurrency wait breaks immediately.
            let permit = tokio::select! {
                biased;
                () = batch_cancel.cancelled() => {
                    started = index;
                    break;
                }
                result = Arc::clone(&semaphore).acquire_owned() => result,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(uri = %uri, error = %e, "concurrency permit not acquired");
                    report.record(
                        uri,
                        DownloadOutcome::failure(FailureReason::PermitNotAcquired, e.to_string()),
                    );
                    continue;
                }
            };

            let transport = Arc::clone(&transport);
            let policy = policy.clone();
            let target = target.clone();
            let token = batch_cancel.clone();
            let tx = tx.clone();
            let task_uri = uri.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome =
                    run_item(transport.as_ref(), &url, &target, policy.as_deref(), &token).await;
                // Receiver outlives every worker unless the batch itself was dropped.
                let _ = tx.send((index, task_uri, outcome));
            });
            workers.push(Worker { index, uri, handle });
        }
        drop(tx);

        for raw in &uris[started..] {
            report.record(
                raw.as_ref().to_string(),
                DownloadOutcome::cancelled("batch cancelled before item started"),
            );
        }

        debug!(in_flight = workers.len(), "waiting for downloads to complete");
        join_workers(workers, &mut rx, &batch_cancel, &mut report).await;

        report.cancelled = batch_cancel.is_cancelled();
        let stats = report.stats;
        info!(
            requested = stats.requested,
            succeeded = stats.succeeded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "batch complete"
        );
        Ok(report)
    }
}

fn validate(request: &DownloadRequest) -> Result<(url::Url, TargetSpec), RequestError> {
    let url = request.parse_uri()?;
    let target = request.target_spec()?;
    Ok((url, target))
}

fn into_paths(report: BatchReport) -> Result<Vec<PathBuf>, BatchError> {
    if report.cancelled {
        Err(BatchError::Cancelled {
            completed: report.paths,
        })
    } else {
        Ok(report.paths)
    }
}
