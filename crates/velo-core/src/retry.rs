//! Retry policy for per-station inventory queries
//!
//! The policy is data (attempt count, first delay, growth factor) and the
//! waiting is delegated to a [`Sleeper`], so tests can drive failures
//! without real delays and observe exactly which delays were requested.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

/// Exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Growth factor applied after each failed retry
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Create a policy that doubles the delay after each failure
    pub fn new(max_retries: usize, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            multiplier: 2,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Set the growth factor
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Total attempts, the first one included
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Delay to wait before retry number `retry` (0-based)
    pub fn delay_before_retry(&self, retry: usize) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(u32::try_from(retry).unwrap_or(u32::MAX));
        self.initial_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Source of delays between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: usize,
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only errors for which [`crate::Error::is_transient`] is true are retried.
/// `op` receives the 1-based attempt number.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts() => {
                let delay = policy.delay_before_retry(attempt - 1);
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    policy.max_attempts(),
                    e,
                    delay
                );
                sleeper.sleep(delay).await;
            }
            Err(e) => {
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}
