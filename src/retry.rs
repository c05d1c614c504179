//! Bounded retry with exponential backoff for remote calls.
//!
//! Wraps a single zero-argument async operation. Transient failures are
//! retried with a `base * 2^attempt` delay, capped at a maximum;
//! non-transient failures propagate immediately. The policy is stateless
//! between invocations — there is no shared rate-limit budget across
//! calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;

/// Errors that distinguish retryable from permanent failures.
pub trait Transient {
    /// Whether retrying the operation could succeed.
    fn is_transient(&self) -> bool;
}

impl Transient for crate::error::FetchError {
    fn is_transient(&self) -> bool {
        crate::error::FetchError::is_transient(self)
    }
}

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            // At least one attempt, or the operation would never run
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Backoff delay before retrying after the given zero-based attempt.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }

    /// Run `op`, retrying transient failures up to the attempt limit.
    ///
    /// Surfaces the last failure once attempts are exhausted.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        what,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
