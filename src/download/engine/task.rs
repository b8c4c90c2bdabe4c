use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::report::BatchReport;
use crate::download::constants::CANCEL_GRACE_PERIOD;
use crate::download::error::DownloadError;
use crate::download::outcome::{DownloadOutcome, FailureReason};
use crate::download::request::TargetSpec;
use crate::download::retry::{RetryPolicy, with_retry};
use crate::download::stream::download_to_path;
use crate::download::transport::Transport;

/// Message a worker sends to the aggregator: input index, URI, outcome.
pub(super) type ItemResult = (usize, String, DownloadOutcome);

/// A spawned worker and the item it is working on.
pub(super) struct Worker {
    pub(super) index: usize,
    pub(super) uri: String,
    pub(super) handle: JoinHandle<()>,
}

/// Resolves the target once, then downloads, optionally under a retry policy.
///
/// Every attempt writes to the same resolved path.
pub(super) async fn run_item(
    transport: &dyn Transport,
    url: &Url,
    target: &TargetSpec,
    policy: Option<&RetryPolicy>,
    cancel: &CancellationToken,
) -> DownloadOutcome {
    let resolved = tokio::select! {
        biased;
        () = cancel.cancelled() => return DownloadOutcome::cancelled(format!("download of {url} cancelled")),
        resolved = target.materialize(url) => resolved,
    };
    let path = match resolved {
        Ok(path) => path,
        Err(e) => {
            let dir = target.directory().map(PathBuf::from).unwrap_or_default();
            return DownloadOutcome::from(Err(DownloadError::io(dir, e)));
        }
    };
    debug!(url = %url, path = %path.display(), "target resolved");

    let outcome = match policy {
        Some(policy) => {
            with_retry(policy, cancel, |_| {
                download_to_path(transport, url, &path, cancel)
            })
            .await
        }
        None => download_to_path(transport, url, &path, cancel).await,
    };

    // Explicit targets belong to the caller; reserved names are ours to release.
    if !outcome.is_success() && !matches!(target, TargetSpec::Explicit(_)) {
        release_empty_reservation(&path).await;
    }
    outcome
}

/// Removes a reserved target that never received a body byte.
///
/// A partially written file is left in place.
async fn release_empty_reservation(path: &Path) {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() == 0 => match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "released unused reservation"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to release unused reservation");
            }
        },
        Ok(_) => debug!(path = %path.display(), "keeping partially written file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to inspect reservation"),
    }
}

pub(super) fn handle_task_join_error(
    uri: String,
    join_error: &JoinError,
    report: &mut BatchReport,
) {
    if join_error.is_cancelled() {
        report.record(uri, DownloadOutcome::cancelled("aborted after cancellation grace period"));
        return;
    }
    warn!(uri = %uri, error = %join_error, "download task panicked");
    report.record(
        uri,
        DownloadOutcome::failure(FailureReason::Transport, format!("task panic: {join_error}")),
    );
}

/// Moves already-sent results into the report and reaps finished workers.
pub(super) async fn drain_finished_workers(
    workers: &mut Vec<Worker>,
    results: &mut UnboundedReceiver<ItemResult>,
    report: &mut BatchReport,
) {
    while let Ok((_, uri, outcome)) = results.try_recv() {
        report.record(uri, outcome);
    }

    let mut idx = 0;
    while idx < workers.len() {
        if workers[idx].handle.is_finished() {
            let worker = workers.swap_remove(idx);
            if let Err(e) = worker.handle.await {
                handle_task_join_error(worker.uri, &e, report);
            }
        } else {
            idx += 1;
        }
    }
}

/// Waits for every worker; once `cancel` fires, waits at most the grace
/// period and aborts whatever is still running.
pub(super) async fn join_workers(
    workers: Vec<Worker>,
    results: &mut UnboundedReceiver<ItemResult>,
    cancel: &CancellationToken,
    report: &mut BatchReport,
) {
    let mut deadline = cancel
        .is_cancelled()
        .then(|| Instant::now() + CANCEL_GRACE_PERIOD);
    let mut aborted: BTreeSet<usize> = BTreeSet::new();
    let mut aborted_uris = Vec::new();

    for Worker {
        index,
        uri,
        mut handle,
    } in workers
    {
        let joined = match deadline {
            Some(at) => tokio::time::timeout_at(at, &mut handle).await.ok(),
            None => {
                tokio::select! {
                    biased;
                    joined = &mut handle => Some(joined),
                    () = cancel.cancelled() => {
                        let at = Instant::now() + CANCEL_GRACE_PERIOD;
                        deadline = Some(at);
                        debug!(grace_ms = CANCEL_GRACE_PERIOD.as_millis(), "batch cancelled, waiting for in-flight items");
                        tokio::time::timeout_at(at, &mut handle).await.ok()
                    }
                }
            }
        };

        match joined {
            Some(Ok(())) => {}
            Some(Err(e)) => handle_task_join_error(uri, &e, report),
            None => {
                // Timed out waiting for this task; abort it and wait until it
                // has actually stopped so a late send is not missed below.
                handle.abort();
                match handle.await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => {
                        aborted.insert(index);
                        aborted_uris.push((index, uri));
                    }
                    Err(e) => handle_task_join_error(uri, &e, report),
                }
            }
        }
    }

    // Workers send before finishing, so every result is already queued.
    while let Ok((index, uri, outcome)) = results.try_recv() {
        aborted.remove(&index);
        report.record(uri, outcome);
    }

    for (index, uri) in aborted_uris {
        if aborted.contains(&index) {
            warn!(uri = %uri, "item still running after grace period, aborted");
            report.record(
                uri,
                DownloadOutcome::cancelled("aborted after cancellation grace period"),
            );
        }
    }
}
