//! Single-item downloader: one GET streamed to one file.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::TRANSFER_BUFFER_SIZE;
use super::error::DownloadError;
use super::outcome::{DownloadFailure, DownloadOutcome};
use super::transport::{Transport, TransportResponse};

/// Downloads `url` into `target` through `transport`.
///
/// The parent directory of `target` is created if missing. The body is
/// copied through a fixed-size buffer, so memory use does not grow with the
/// file. A non-2xx status, a transport error, a filesystem error or
/// cancellation yields a failure; `target` may then hold a truncated file
/// that the caller is responsible for removing.
#[instrument(skip(transport, cancel), fields(url = %url, path = %target.display()))]
pub async fn download_to_path(
    transport: &dyn Transport,
    url: &Url,
    target: &Path,
    cancel: &CancellationToken,
) -> DownloadOutcome {
    match transfer(transport, url, target, cancel).await {
        Ok(bytes) => {
            info!(bytes, "download complete");
            DownloadOutcome::Success {
                path: target.to_path_buf(),
            }
        }
        Err(error) => {
            let failure = DownloadFailure::from(&error);
            if matches!(error, DownloadError::Cancelled { .. }) {
                debug!("download cancelled");
            } else {
                debug!(reason = %failure.reason, error = %error, "download failed");
            }
            DownloadOutcome::Failure(failure)
        }
    }
}

async fn transfer(
    transport: &dyn Transport,
    url: &Url,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(DownloadError::cancelled(url.as_str())),
        response = transport.get(url) => response?,
    };

    if !response.is_success() {
        return Err(DownloadError::http_status(url.as_str(), response.status));
    }

    let expected = response.content_length;
    let written = stream_to_file(response, url, target, cancel).await?;

    if let Some(expected) = expected
        && written < expected
    {
        return Err(DownloadError::integrity(target, expected, written));
    }

    Ok(written)
}

/// Copies the body to `target`, racing every read and write against `cancel`.
async fn stream_to_file(
    response: TransportResponse,
    url: &Url,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let mut body = response.body;
    let mut file = File::create(target)
        .await
        .map_err(|e| DownloadError::io(target, e))?;
    let mut buffer = vec![0u8; TRANSFER_BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url.as_str())),
            read = body.read(&mut buffer) => read.map_err(|e| DownloadError::body(url.as_str(), e))?,
        };
        if read == 0 {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url.as_str())),
            written = file.write_all(&buffer[..read]) => {
                written.map_err(|e| DownloadError::io(target, e))?;
            }
        }
        bytes_written += read as u64;
    }

    // Ensure all data is flushed to disk
    file.flush().await.map_err(|e| DownloadError::io(target, e))?;

    Ok(bytes_written)
}
