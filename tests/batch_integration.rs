//! Batch download behavior against in-process transports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulkfetch_core::download::{BatchError, FailureReason, Fetcher, RetryPolicy, Transport};
use support::transports::{FlakyTransport, InstrumentedTransport};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn uris(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("http://files.test/doc{i}.bin"))
        .collect()
}

fn dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn assert_file_contains(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(content, expected, "unexpected content in {}", path.display());
}

#[tokio::test]
async fn test_empty_batch_returns_empty_without_io() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::ZERO));
    let gauge = transport.gauge();
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("never-created");

    let uris: Vec<String> = Vec::new();
    let paths = fetcher
        .download_multiple(&target, &uris, 4, &CancellationToken::new())
        .await
        .unwrap();

    assert!(paths.is_empty());
    assert_eq!(gauge.started(), 0);
    assert!(!target.exists());
}

#[tokio::test]
async fn test_batch_never_exceeds_max_concurrent() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::from_millis(40)));
    let gauge = transport.gauge();
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();

    let paths = fetcher
        .download_multiple(temp_dir.path(), &uris(12), 3, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(paths.len(), 12);
    assert_eq!(gauge.started(), 12);
    assert!(gauge.peak() <= 3, "peak {} exceeded limit", gauge.peak());
    assert!(gauge.peak() >= 2, "transfers never overlapped");
    assert_eq!(gauge.active(), 0);
}

#[tokio::test]
async fn test_concurrency_one_runs_sequentially() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::from_millis(5)));
    let gauge = transport.gauge();
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();

    let paths = fetcher
        .download_multiple(temp_dir.path(), &uris(5), 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(paths.len(), 5);
    assert_eq!(gauge.peak(), 1);
}

#[tokio::test]
async fn test_one_failure_does_not_abort_siblings() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::from_millis(5)));
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();

    let mut batch = uris(9);
    batch.insert(4, "http://files.test/fail.bin".to_string());

    let report = fetcher
        .run_batch(temp_dir.path(), &batch, 4, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.paths.len(), 9);
    assert_eq!(report.stats.succeeded, 9);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.total(), 10);
    assert!(!report.cancelled);
    assert!(!report.all_succeeded());
    assert_eq!(report.failures[0].uri, "http://files.test/fail.bin");
    assert_eq!(report.failures[0].reason, FailureReason::HttpStatus);

    for path in &report.paths {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_file_contains(path, &format!("/{name}"));
    }
    assert!(!temp_dir.path().join("fail.bin").exists());
    assert_eq!(dir_entries(temp_dir.path()), 9);
}

#[tokio::test]
async fn test_download_multiple_drops_failed_items() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::ZERO));
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();

    let batch = vec![
        "http://files.test/a.txt".to_string(),
        "not a url".to_string(),
        "http://files.test/fail.txt".to_string(),
        "http://files.test/b.txt".to_string(),
    ];
    let paths = fetcher
        .download_multiple(temp_dir.path(), &batch, 2, &CancellationToken::new())
        .await
        .unwrap();

    let names: HashSet<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, HashSet::from(["a.txt".to_string(), "b.txt".to_string()]));
}

#[tokio::test]
async fn test_colliding_names_get_distinct_paths() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::from_millis(10)));
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();

    let batch = vec!["http://files.test/report.pdf"; 6];
    let paths = fetcher
        .download_multiple(temp_dir.path(), &batch, 6, &CancellationToken::new())
        .await
        .unwrap();

    let unique: HashSet<&PathBuf> = paths.iter().collect();
    assert_eq!(paths.len(), 6);
    assert_eq!(unique.len(), 6, "paths collided: {paths:?}");
    assert!(temp_dir.path().join("report.pdf").exists());
    assert!(temp_dir.path().join("report_5.pdf").exists());
    for path in &paths {
        assert_file_contains(path, "/report.pdf");
    }
}

#[tokio::test]
async fn test_cancel_stops_batch_within_grace_period() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::from_secs(30)));
    let gauge = transport.gauge();
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started_at = Instant::now();
    let report = fetcher
        .run_batch(temp_dir.path(), &uris(20), 2, None, &cancel)
        .await
        .unwrap();
    let elapsed = started_at.elapsed();

    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert!(report.cancelled);
    assert_eq!(gauge.started(), 2, "queued items must not start after cancel");
    assert_eq!(report.stats.cancelled, 20);
    assert_eq!(report.stats.succeeded, 0);
    assert_eq!(report.stats.total(), 20);
    assert_eq!(gauge.active(), 0);
}

#[tokio::test]
async fn test_download_multiple_reports_cancellation() {
    let transport = Arc::new(InstrumentedTransport::new(Duration::ZERO));
    let gauge = transport.gauge();
    let fetcher = Fetcher::with_transport(transport);
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetcher
        .download_multiple(temp_dir.path(), &uris(3), 2, &cancel)
        .await
        .unwrap_err();

    match err {
        BatchError::Cancelled { completed } => assert!(completed.is_empty()),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(gauge.started(), 0);
}

#[tokio::test]
async fn test_batch_with_retry_recovers_transient_failures() {
    let transport = Arc::new(FlakyTransport::new(2));
    let fetcher = Fetcher::with_transport(Arc::clone(&transport) as Arc<dyn Transport>);
    let temp_dir = TempDir::new().unwrap();
    let policy = RetryPolicy::new(3, 0.01).unwrap();

    let batch = uris(4);
    let paths = fetcher
        .download_multiple_with_retry(temp_dir.path(), &batch, 2, &policy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(paths.len(), 4);
    // Every attempt of an item writes to the one path reserved for it.
    assert_eq!(dir_entries(temp_dir.path()), 4);
    for uri in &batch {
        assert_eq!(transport.attempts(uri), 3, "{uri}");
    }
}

#[tokio::test]
async fn test_batch_with_retry_gives_up_after_max_attempts() {
    let transport = Arc::new(FlakyTransport::new(5));
    let fetcher = Fetcher::with_transport(Arc::clone(&transport) as Arc<dyn Transport>);
    let temp_dir = TempDir::new().unwrap();
    let policy = RetryPolicy::new(2, 0.01).unwrap();

    let batch = uris(2);
    let report = fetcher
        .run_batch(temp_dir.path(), &batch, 2, Some(&policy), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.failed, 2);
    assert!(
        report
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::Transport)
    );
    for uri in &batch {
        assert_eq!(transport.attempts(uri), 2);
    }
    assert_eq!(dir_entries(temp_dir.path()), 0, "empty reservations must be released");
}
