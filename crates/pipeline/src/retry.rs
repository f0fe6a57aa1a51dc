//! Timeout and exponential backoff around collaborator calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use covermap_core::{Error, Result};

/// How archive queries and exports are retried.
///
/// Every attempt runs under `attempt_timeout_ms`; a timed-out attempt counts
/// as a transient failure. Only errors for which
/// [`Error::is_transient`] holds are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    /// Delay after the first failure; doubled after each further failure.
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_ms: 60 * 60 * 1000,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidParameter {
                name: "retry.max_attempts",
                value: "0".into(),
                reason: "at least one attempt is needed".into(),
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(Error::InvalidParameter {
                name: "retry.attempt_timeout_ms",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay before attempt `attempt + 1`, after `attempt` failures.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.attempt_timeout(), op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{what} timed out after {:?}", self.attempt_timeout()),
                ))),
            };
            match outcome {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(attempt, max = self.max_attempts, ?delay, error = %e, "{what} failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
