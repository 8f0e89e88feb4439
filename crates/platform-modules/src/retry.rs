//! Retry with exponential backoff for retryable lifecycle failures.
//!
//! Lifecycle calls are idempotent from the caller's point of view: after a
//! `Timeout` or `StorageFailure` nothing was applied, so repeating the same
//! call is safe. Precondition failures are returned immediately.
//!
//! # Example
//!
//! ```rust,no_run
//! use platform_modules::retry::{with_retry_if, RetryConfig};
//! use platform_modules::ModuleError;
//!
//! async fn example() -> Result<(), ModuleError> {
//!     with_retry_if(
//!         &RetryConfig::fast(),
//!         || async { Ok(()) },
//!         ModuleError::is_retryable,
//!     )
//!     .await
//! }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Base for exponential backoff
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Short delays, for tests and latency-sensitive callers.
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
            exponential_base: 2.0,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute `f`, retrying errors for which `is_retryable` returns true.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `max_attempts` is reached.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut f: F,
    mut is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= config.max_attempts => {
                tracing::error!(attempts = attempt, error = %e, "All retry attempts exhausted");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
