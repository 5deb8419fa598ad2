//! Bounded retry
//!
//! Lease acquisition retries a fixed number of times at a fixed interval.
//! The scheduler spaces its pauses after consecutive store failures
//! exponentially.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Spacing between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial * multiplier^(n-1)`, capped at `max`
    Exponential {
        /// Delay before the first retry
        initial: Duration,
        /// Upper bound on any delay
        max: Duration,
        /// Growth factor
        multiplier: f64,
    },
}

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay strategy
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    /// `max_attempts` tries spaced by `interval`
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(interval),
        }
    }

    /// Exponential spacing starting at `initial`, doubling, capped at `max`
    #[must_use]
    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                initial,
                max,
                multiplier: 2.0,
            },
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub(crate) fn delay_after(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(interval) => *interval,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let millis = (initial.as_millis() as f64 * factor).min(max.as_millis() as f64);
                Duration::from_millis(millis as u64)
            }
        }
    }
}

/// Final failure of a retried operation
#[derive(Debug)]
pub struct RetryError<E> {
    /// The last error encountered
    pub last_error: E,
    /// Attempts made
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Run `operation` until it succeeds, returns a non-retryable error, or the
/// policy runs out of attempts.
pub async fn retry_with_policy<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: R,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Debug,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(attempt, error = ?e, "Operation failed, no more retries");
                return Err(RetryError {
                    last_error: e,
                    attempts: attempt,
                });
            }
        }
    }
}
