//! Fixed-delay retry around endpoint work

use crate::config::RetryConfig;
use crate::errors::{AppError, Result};
use crate::metrics::record_retry;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Policy used for connection-level database failures
    pub const fn transient() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.attempts, Duration::from_millis(config.delay_ms))
    }
}

/// Run `operation` up to `policy.attempts` times, sleeping `policy.delay`
/// between failures. Returns the last error.
pub async fn retry_fixed<T, F, Fut>(policy: RetryPolicy, name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(policy, name, |_| true, operation).await
}

/// Like [`retry_fixed`] with [`RetryPolicy::transient`], but fatal errors
/// are returned immediately.
pub async fn retry_transient<T, F, Fut>(name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(RetryPolicy::transient(), name, AppError::is_transient, operation).await
}

async fn retry_when<T, F, Fut, P>(
    policy: RetryPolicy,
    name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&AppError) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && should_retry(&e) => {
                warn!(
                    operation = name,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Attempt failed, retrying"
                );
                record_retry(name);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
