//! HTTP download engine for streaming files to disk.
//!
//! This module provides single and batch downloads over a pluggable
//! [`Transport`], with bounded concurrency, retry with exponential backoff
//! and cooperative cancellation.
//!
//! # Features
//!
//! - Streaming downloads through a fixed 128 KiB buffer
//! - At most `max_concurrent` transfers per batch, permits acquired before spawn
//! - Tagged [`DownloadOutcome`] per item; one failure never aborts its siblings
//! - Collision-free target paths claimed atomically on disk
//! - Cancellation reaches permit waits, transfers and backoff sleeps
//!
//! # Example
//!
//! ```no_run
//! use bulkfetch_core::download::{DownloadRequest, Fetcher, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::default();
//! let request = DownloadRequest::in_directory("https://example.com/paper.pdf", "./downloads");
//! let outcome = fetcher
//!     .download_with_retry(&request, &RetryPolicy::default(), &CancellationToken::new())
//!     .await?;
//! if let Some(path) = outcome.path() {
//!     println!("Downloaded: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod outcome;
mod request;
mod retry;
mod stream;
mod transport;

pub use client::{ClientSettings, HttpClient};
pub use engine::{
    BatchError, BatchReport, BatchStats, DEFAULT_CONCURRENCY, Fetcher, ItemFailure,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use error::{DownloadError, RequestError};
pub use filename::{random_unique_path, reserve_unique_path};
pub use outcome::{DownloadFailure, DownloadOutcome, FailureReason};
pub use request::{DownloadRequest, TargetSpec};
pub use retry::{
    DEFAULT_BASE_DELAY_SECS, DEFAULT_MAX_ATTEMPTS, PolicyCache, RetryDecision, RetryPolicy,
    with_retry,
};
pub use stream::download_to_path;
pub use transport::{
    BodyReader, HttpClientPool, StaticTransport, Transport, TransportProvider, TransportResponse,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
