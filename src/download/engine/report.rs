//! Aggregated result of one batch call.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::download::outcome::{DownloadFailure, DownloadOutcome, FailureReason};

/// Counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Number of URIs handed to the batch.
    pub requested: usize,
    /// Items that produced a file.
    pub succeeded: usize,
    /// Items that failed for any reason other than cancellation.
    pub failed: usize,
    /// Items cancelled in flight or never started because of cancellation.
    pub cancelled: usize,
}

impl BatchStats {
    /// Items that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// A failed item as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Source URI as given.
    pub uri: String,
    /// Failure category.
    pub reason: FailureReason,
    /// Human-readable cause.
    pub detail: String,
}

/// Everything a batch produced: successful paths, failures and counters.
///
/// Paths are in completion order, which has no relation to input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Files written, one per successful item.
    pub paths: Vec<PathBuf>,
    /// Items that did not produce a file.
    pub failures: Vec<ItemFailure>,
    /// Counters.
    pub stats: BatchStats,
    /// Whether the batch's cancellation token fired.
    pub cancelled: bool,
}

impl BatchReport {
    pub(crate) fn new(requested: usize) -> Self {
        Self {
            stats: BatchStats {
                requested,
                ..BatchStats::default()
            },
            ..Self::default()
        }
    }

    /// Records one terminal outcome. The report is only ever touched by the
    /// task that drives the batch.
    pub(crate) fn record(&mut self, uri: String, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Success { path } => {
                self.stats.succeeded += 1;
                self.paths.push(path);
            }
            DownloadOutcome::Failure(failure) => self.record_failure(uri, failure),
        }
    }

    fn record_failure(&mut self, uri: String, failure: DownloadFailure) {
        let DownloadFailure { reason, detail } = failure;
        if reason == FailureReason::Cancelled {
            debug!(uri = %uri, detail = %detail, "item cancelled");
            self.stats.cancelled += 1;
        } else {
            warn!(uri = %uri, reason = %reason, detail = %detail, "item failed");
            self.stats.failed += 1;
        }
        self.failures.push(ItemFailure {
            uri,
            reason,
            detail,
        });
    }

    /// Returns true when every requested item produced a file.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.stats.succeeded == self.stats.requested
    }
}
