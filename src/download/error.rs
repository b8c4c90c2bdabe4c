//! Error types for the download module.
//!
//! [`DownloadError`] is the typed cause of a failed transfer. It never
//! crosses an item boundary: the downloader converts it into a
//! [`DownloadFailure`](super::DownloadFailure) so one item cannot unwind its
//! siblings. [`RequestError`] covers caller mistakes that are detected before
//! any network I/O.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a single file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (anything outside 2xx).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body stream failed after headers were received.
    #[error("error reading response body from {url}: {source}")]
    Body {
        /// The URL whose body could not be read.
        url: String,
        /// The underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// File system error during download (create directory, create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Body ended before the announced content length was received.
    #[error(
        "incomplete download to {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path holding the truncated body.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The transfer was aborted because cancellation was requested.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL whose transfer was cancelled.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body read error, promoting wrapped reqwest timeouts to [`Self::Timeout`].
    pub fn body(url: impl Into<String>, source: std::io::Error) -> Self {
        let timed_out = source.kind() == std::io::ErrorKind::TimedOut
            || source
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
                .is_some_and(reqwest::Error::is_timeout);
        if timed_out {
            Self::timeout(url)
        } else {
            Self::Body {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an incomplete-body error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error does not carry.

/// Caller errors detected before any network I/O.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    /// Neither an explicit path nor a directory was supplied.
    #[error("no target for {uri}: supply a path or a directory")]
    MissingTarget {
        /// The URI that could not be given a target.
        uri: String,
    },

    /// The URI is not an absolute http(s) URL.
    #[error("invalid URI {uri}: {reason}")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Retry configuration outside the accepted range.
    #[error(
        "invalid retry policy: max_attempts={max_attempts} (must be >= 1), base_delay_secs={base_delay_secs} (must be finite and > 0)"
    )]
    InvalidRetryPolicy {
        /// Requested attempt count.
        max_attempts: u32,
        /// Requested base delay in seconds.
        base_delay_secs: f64,
    },
}

impl RequestError {
    /// Creates an invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}
