//! Bulkfetch Core Library
//!
//! This library provides the core functionality for the bulkfetch tool:
//! fetching many HTTP(S) resources to local files with a bounded number of
//! simultaneous transfers, per-item failure isolation, retry with
//! exponential backoff and cooperative cancellation.
//!
//! # Architecture
//!
//! - [`download`] - transport abstraction, single-item downloader, retry
//!   executor and the bounded batch orchestrator ([`Fetcher`])

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use download::{
    BatchError, BatchReport, DEFAULT_CONCURRENCY, DownloadError, DownloadOutcome,
    DownloadRequest, FailureReason, Fetcher, HttpClient, RequestError, RetryPolicy, Transport,
    with_retry,
};
