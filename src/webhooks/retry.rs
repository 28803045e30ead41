//! Generic retry with backoff.
//!
//! [`RetryPolicy::run`] calls an async operation until it succeeds or the
//! attempt budget is spent, sleeping between attempts. It knows nothing
//! about HTTP; the dispatcher plugs its transport in as the operation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt` after attempt `attempt` (numbered from 1).
    Exponential { base: Duration },
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// Retry immediately.
    None,
}

impl Backoff {
    /// Delay to wait after the given failed attempt (numbered from 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential { base } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
            Self::Fixed(delay) => *delay,
            Self::None => Duration::ZERO,
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded on attempt `attempts`.
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed.
    Exhausted { attempts: u32, last_error: E },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Attempt budget plus backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// A policy allowing `max_attempts` tries in total (at least one).
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Doubling delay starting at 2s after the first failure.
    pub fn exponential_seconds(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            Backoff::Exponential {
                base: Duration::from_secs(1),
            },
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `operation` under this policy.
    ///
    /// The closure receives the 1-based attempt number. No sleep follows
    /// the final attempt.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= self.max_attempts => {
                    tracing::debug!(
                        attempts = attempt,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    };
                }
                Err(e) => {
                    let delay = self.backoff.delay_after(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
