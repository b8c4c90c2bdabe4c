//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download many URLs at once with bounded concurrency and retry.
///
/// URLs come from the arguments or, when none are given, from stdin (one per
/// line; blank lines and `#` comments are ignored). Successful paths are
/// printed one per line.
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Directory downloads are written to [default: .]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100) [default: 10]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Total attempts per URL, first try included (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Backoff base in seconds; attempt n waits base^n [default: 2.0]
    #[arg(long, value_parser = parse_base_delay)]
    pub base_delay: Option<f64>,

    /// Make a single attempt per URL
    #[arg(long, conflicts_with = "max_attempts")]
    pub no_retry: bool,

    /// Print a JSON report instead of one path per line
    #[arg(long)]
    pub json: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_base_delay(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value > 0.0 && value <= 60.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not in (0, 60]"))
    }
}
