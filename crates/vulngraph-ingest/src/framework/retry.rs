//! Exponential backoff for task functions
//!
//! The scheduler never retries. Task functions that call flaky remote services
//! wrap the call in [`retry_transient`], which retries only
//! [`TaskError::Transient`] outcomes.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::TaskError;

/// Retry policy for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let mut retry = 0;
    loop {
        match attempt_fn().await {
            Err(TaskError::Transient(cause)) if retry < policy.max_retries => {
                retry += 1;
                let backoff = policy.backoff(retry);
                warn!(
                    operation,
                    attempt = retry,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    cause = %cause,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
            },
            outcome => return outcome,
        }
    }
}
