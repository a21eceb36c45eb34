//! Exponential backoff for transient failures

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy: `max_attempts` total tries, delay doubles from `base_delay`
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Delay after the given zero-based failed attempt (1s, 2s, 4s, ...)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Errors that know whether another attempt could succeed
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// The closure receives the zero-based attempt number. The last error is
/// returned unchanged once the budget is spent.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
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
