//! CLI entry point for the bulkfetch tool.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bulkfetch_core::download::{
    BatchReport, ClientSettings, DEFAULT_CONCURRENCY, Fetcher, HttpClientPool, RetryPolicy,
    constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS},
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, load_config};
use cli::Args;

const EXIT_SUCCESS: u8 = 0;
/// Some items failed.
const EXIT_PARTIAL: u8 = 2;
/// The batch was interrupted.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_tracing(&args, &config);
    debug!(?args, ?config, "CLI arguments parsed");

    // Read input: from positional args or stdin
    let input_text = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read URLs from stdin")?;
        buffer
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/file.pdf' | bulkfetch -o downloads");
        return Ok(ExitCode::SUCCESS);
    };

    let urls = parse_url_lines(&input_text);
    if urls.is_empty() {
        info!("No URLs found in input");
        return Ok(ExitCode::SUCCESS);
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let concurrency = args
        .concurrency
        .or(config.concurrency)
        .map_or(DEFAULT_CONCURRENCY, usize::from);
    let policy = retry_policy(&args, &config)?;

    let settings = ClientSettings::with_timeouts(
        config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    );
    let fetcher = Fetcher::new(Arc::new(HttpClientPool::new(settings)));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling downloads");
            interrupt.cancel();
        }
    });

    info!(
        urls = urls.len(),
        concurrency,
        max_attempts = policy.as_ref().map_or(1, RetryPolicy::max_attempts),
        output_dir = %output_dir.display(),
        "Starting downloads"
    );

    let report = fetcher
        .run_batch(&output_dir, &urls, concurrency, policy.as_ref(), &cancel)
        .await?;

    print_report(&report, args.json)?;

    info!(
        succeeded = report.stats.succeeded,
        failed = report.stats.failed,
        cancelled = report.stats.cancelled,
        "Download complete"
    );

    Ok(ExitCode::from(exit_status(&report)))
}

/// Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info.
fn init_tracing(args: &Args, config: &FileConfig) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => config.verbosity.map_or("info", |v| v.filter()),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn retry_policy(args: &Args, config: &FileConfig) -> Result<Option<RetryPolicy>> {
    if args.no_retry {
        return Ok(None);
    }
    let defaults = RetryPolicy::default();
    let max_attempts = args
        .max_attempts
        .or(config.max_attempts)
        .unwrap_or(defaults.max_attempts());
    let base_delay = args
        .base_delay
        .or(config.base_delay_secs)
        .unwrap_or(defaults.base_delay_secs());
    let policy = RetryPolicy::new(max_attempts, base_delay).context("Invalid retry settings")?;
    Ok(Some(policy))
}

/// One URL per line; blank lines and `#` comments are skipped.
fn parse_url_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, report).context("Failed to encode report")?;
        writeln!(out)?;
    } else {
        for path in &report.paths {
            writeln!(out, "{}", path.display())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn exit_status(report: &BatchReport) -> u8 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.all_succeeded() {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL
    }
}
