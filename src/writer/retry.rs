use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::{Error, Result};

/// Retry behavior for a single operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    /// `0` retries forever.
    pub max_attempts: usize,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Ceiling for the exponential backoff.
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Immediate retries, no delay between attempts.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Constant delay between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self.max_delay = delay;
        self
    }

    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_delay = max_delay;
        self
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }

        let ceiling = self.max_delay.max(self.initial_delay);
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);

        // The multiplier outgrows what a Duration can hold, so cap before converting.
        Duration::try_from_secs_f64(secs.min(ceiling.as_secs_f64()))
            .map_or(ceiling, |delay| delay.min(ceiling))
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// Exhaustion is reported as [`Error::RetriesExhausted`] wrapping the last
    /// failure. Non-retryable errors are returned as they are.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                error!(error = %err, "failed to {}, error is not retryable", operation);
                return Err(err);
            }

            if self.max_attempts != 0 && attempt >= self.max_attempts {
                error!(
                    error = %err,
                    "failed to {} after {} attempts, retry limit exceeded",
                    operation, attempt
                );
                return Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!(
                error = %err,
                "failed to {}, {} of {} max retries",
                operation, attempt, self.max_attempts
            );

            let delay = self.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
