//! Exponential backoff around store operations that may fail transiently.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_max_attempts, config.retry_base_delay())
    }

    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * (1u32 << (retry.saturating_sub(1)).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{label} attempt {attempt} failed ({e}), retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
