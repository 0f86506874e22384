//! Bounded retry with exponential backoff for idempotent reads

use std::future::Future;
use std::time::Duration;

use vault_core::{ChainConfig, ChainError};

/// How often and how patiently a read is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ChainConfig) -> Self {
        Self {
            max_attempts: config.max_read_attempts.max(1),
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ChainConfig::default())
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only [`ChainError::is_transient`] failures are retried. Never wrap a
/// state-changing call in this.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    label,
                    attempt,
                    policy.max_attempts,
                    backoff.as_millis(),
                    e
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
