//! Bounded retry with exponential backoff
//!
//! Drives the correction executor: a fixed number of attempts with computed
//! delays, never recursion.
//!
//! # Example
//!
//! ```ignore
//! use ensina_session::retry::{with_retry, RetryConfig};
//!
//! let result = with_retry(RetryConfig::default(), || async {
//!     validator.resynchronize().await
//! }).await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Whether to add jitter to the computed delay.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            add_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay for exponential backoff.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between attempts.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn with_jitter(mut self, enable: bool) -> Self {
        self.add_jitter = enable;
        self
    }

    /// Calculate the delay after a given failed attempt (0-based).
    ///
    /// Uses exponential backoff: `base_delay * 2^attempt`, capped at
    /// `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(multiplier);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64));

        if self.add_jitter {
            // Up to 25% jitter
            let jitter_range = delay.as_millis() as u64 / 4;
            let jitter = if jitter_range > 0 {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                Duration::from_millis(nanos % jitter_range)
            } else {
                Duration::ZERO
            };
            delay + jitter
        } else {
            delay
        }
    }
}

/// Execute an async operation with bounded retry.
///
/// Stops on the first success, on a non-retryable error, or once
/// `max_attempts` calls have been made.
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;
                if !err.is_retryable() || attempt >= config.max_attempts {
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );

                sleep(delay).await;
            }
        }
    }
}

/// Trait for errors that can indicate whether they're retryable.
pub trait RetryableError {
    /// Returns true if this error is retryable.
    fn is_retryable(&self) -> bool;
}

impl RetryableError for crate::AuthError {
    fn is_retryable(&self) -> bool {
        crate::AuthError::is_retryable(self)
    }
}
