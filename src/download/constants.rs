//! Constants for the download module (timeouts, buffers, batch limits).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Size of the buffer used to copy a response body to disk (128 KiB).
pub const TRANSFER_BUFFER_SIZE: usize = 128 * 1024;

/// How long a cancelled batch waits for in-flight items before aborting them.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound for a single backoff sleep (1 hour).
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(3600);

/// Logical name of the transport used when the caller does not pick one.
pub const DEFAULT_TRANSPORT_NAME: &str = "default";
