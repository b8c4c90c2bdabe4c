//! Retry logic with exponential backoff for failed downloads.
//!
//! This module provides the [`RetryPolicy`] type and the [`with_retry`]
//! executor that wraps any download-shaped operation.
//!
//! # Overview
//!
//! An operation returns a [`DownloadOutcome`]. Every failure is retried
//! except [`FailureReason::Cancelled`] and [`FailureReason::InvalidRequest`],
//! until `max_attempts` invocations have been made in total. Between attempts
//! the executor sleeps `base_delay_secs ^ attempt` seconds, racing the
//! cancellation token the whole time.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bulkfetch_core::download::{FailureReason, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//!
//! match policy.should_retry(FailureReason::HttpStatus, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(2));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::constants::MAX_BACKOFF_DELAY;
use super::outcome::{DownloadOutcome, FailureReason};
use super::RequestError;

/// Default total number of attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base in seconds.
pub const DEFAULT_BASE_DELAY_SECS: f64 = 2.0;

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3 (total invocations, the first one included)
/// - `base_delay_secs`: 2.0
/// - `jitter`: none
///
/// # Delay Calculation
///
/// ```text
/// delay(attempt) = min(base_delay_secs ^ attempt, 1h) + random(0..=jitter)
/// ```
///
/// With defaults, delays are 2s then 4s before the attempts run out.
///
/// A policy holds configuration only; it is safe to share one instance
/// between any number of concurrent calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_secs: f64,
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRetryPolicy`] when `max_attempts` is zero
    /// or `base_delay_secs` is not a finite positive number.
    pub fn new(max_attempts: u32, base_delay_secs: f64) -> Result<Self, RequestError> {
        if max_attempts == 0 || !base_delay_secs.is_finite() || base_delay_secs <= 0.0 {
            return Err(RequestError::InvalidRetryPolicy {
                max_attempts,
                base_delay_secs,
            });
        }
        Ok(Self {
            max_attempts,
            base_delay_secs,
            jitter: Duration::ZERO,
        })
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Adds up to `jitter` of random delay to every backoff sleep.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff base in seconds.
    #[must_use]
    pub fn base_delay_secs(&self) -> f64 {
        self.base_delay_secs
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed with `reason`.
    #[must_use]
    pub fn should_retry(&self, reason: FailureReason, attempt: u32) -> RetryDecision {
        if !reason.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: format!("{reason} failures are not retried"),
            };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(attempt),
            attempt: attempt + 1,
        }
    }

    /// Delay to wait after `attempt` failed.
    ///
    /// Formula: `min(base_delay_secs ^ attempt, 1h) + jitter`
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self
            .base_delay_secs
            .powi(exponent)
            .min(MAX_BACKOFF_DELAY.as_secs_f64());
        Duration::from_secs_f64(secs) + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Runs `operation` under `policy`, hiding retries from the caller.
///
/// `operation` receives the 1-indexed attempt number. Both the operation and
/// the backoff sleep race `cancel`; once it fires no further attempt starts
/// and a cancelled outcome is returned. After the last failed attempt the
/// final failure is returned unchanged.
pub async fn with_retry<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> DownloadOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DownloadOutcome>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return DownloadOutcome::cancelled(format!("cancelled before attempt {attempt}"));
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                DownloadOutcome::cancelled(format!("cancelled during attempt {attempt}"))
            }
            outcome = operation(attempt) => outcome,
        };

        let DownloadOutcome::Failure(failure) = &outcome else {
            if attempt > 1 {
                debug!(attempt, "succeeded after retry");
            }
            return outcome;
        };

        match policy.should_retry(failure.reason, attempt) {
            RetryDecision::DoNotRetry { reason } => {
                debug!(attempt, failure = %failure.reason, reason = %reason, "giving up");
                return outcome;
            }
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = %failure.reason,
                    detail = %failure.detail,
                    "attempt failed, backing off"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return DownloadOutcome::cancelled(format!(
                            "cancelled while waiting to retry after attempt {attempt}"
                        ));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = next;
            }
        }
    }
}

/// Shared policies keyed by `(max_attempts, base_delay_secs)`.
///
/// Entries are plain configuration and carry nothing about the calls that
/// requested them.
#[derive(Debug, Default)]
pub struct PolicyCache {
    policies: DashMap<(u32, u64), Arc<RetryPolicy>>,
}

impl PolicyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached policy for this configuration, creating it once.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRetryPolicy`] for invalid settings;
    /// nothing is cached in that case.
    pub fn get_or_create(
        &self,
        max_attempts: u32,
        base_delay_secs: f64,
    ) -> Result<Arc<RetryPolicy>, RequestError> {
        let key = (max_attempts, base_delay_secs.to_bits());
        if let Some(existing) = self.policies.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }
        let policy = Arc::new(RetryPolicy::new(max_attempts, base_delay_secs)?);
        let entry = self.policies.entry(key).or_insert(policy);
        Ok(Arc::clone(entry.value()))
    }

    /// Number of distinct policies cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true when nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
