//! Rate limiting and bounded retries for management API calls.
//!
//! Only one call is in flight per run, so a fixed pause after each
//! quota-limited call keeps a run under a per-second quota without a token
//! bucket.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ExecutorError;
use crate::config::EngineConfig;

/// Fixed minimum delay between quota-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.api_call_delay())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits out the delay. Call after every quota-limited request.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Attempt ceiling and fixed backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            backoff: config.retry_backoff(),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Runs `op`, retrying transient failures with a fixed backoff until the
/// attempt ceiling, then surfaces the last error.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExecutorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}
