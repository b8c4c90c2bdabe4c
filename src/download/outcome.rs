//! Tagged result of a download-shaped operation.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::DownloadError;

/// Why an item did not produce a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Connection, TLS or body stream failure.
    Transport,
    /// The request or body read timed out.
    Timeout,
    /// The server answered with a non-2xx status.
    HttpStatus,
    /// Creating the directory or writing the file failed.
    Filesystem,
    /// The item could not be turned into a request (bad URI, no target).
    InvalidRequest,
    /// A concurrency permit could not be obtained for the item.
    PermitNotAcquired,
    /// Cancellation was requested before the item finished.
    Cancelled,
}

impl FailureReason {
    /// Returns whether another attempt could change the result.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Cancelled | Self::InvalidRequest)
    }

    /// Stable label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Filesystem => "filesystem",
            Self::InvalidRequest => "invalid_request",
            Self::PermitNotAcquired => "permit_not_acquired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed item: a reason for branching plus the rendered cause for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    /// Failure category.
    pub reason: FailureReason,
    /// Human-readable cause.
    pub detail: String,
}

impl DownloadFailure {
    /// Creates a failure with the given reason and detail.
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl From<&DownloadError> for DownloadFailure {
    fn from(error: &DownloadError) -> Self {
        let reason = match error {
            DownloadError::Network { .. }
            | DownloadError::Body { .. }
            | DownloadError::Integrity { .. }
            | DownloadError::ClientBuild { .. } => FailureReason::Transport,
            DownloadError::Timeout { .. } => FailureReason::Timeout,
            DownloadError::HttpStatus { .. } => FailureReason::HttpStatus,
            DownloadError::Io { .. } => FailureReason::Filesystem,
            DownloadError::Cancelled { .. } => FailureReason::Cancelled,
        };
        Self::new(reason, error.to_string())
    }
}

/// Result of downloading one item.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a download outcome reports whether a file was written"]
pub enum DownloadOutcome {
    /// Exactly one file was written at `path`.
    Success {
        /// Where the body was written.
        path: PathBuf,
    },
    /// No usable file; the target, if any, is indeterminate.
    Failure(DownloadFailure),
}

impl DownloadOutcome {
    /// Creates a failed outcome.
    pub fn failure(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self::Failure(DownloadFailure::new(reason, detail))
    }

    /// Creates a cancelled outcome.
    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::failure(FailureReason::Cancelled, detail)
    }

    /// Returns true when a file was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true when the item ended because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Failure(DownloadFailure {
                reason: FailureReason::Cancelled,
                ..
            })
        )
    }

    /// Path of the written file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success { path } => Some(path),
            Self::Failure(_) => None,
        }
    }

    /// Failure details, if any.
    #[must_use]
    pub fn failure_details(&self) -> Option<&DownloadFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Consumes the outcome, returning the path on success.
    #[must_use]
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Self::Success { path } => Some(path),
            Self::Failure(_) => None,
        }
    }
}

impl From<Result<PathBuf, DownloadError>> for DownloadOutcome {
    fn from(result: Result<PathBuf, DownloadError>) -> Self {
        match result {
            Ok(path) => Self::Success { path },
            Err(error) => Self::Failure(DownloadFailure::from(&error)),
        }
    }
}
