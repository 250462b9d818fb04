//! Exponential backoff for recoverable remote failures
//!
//! Wraps one remote call at a time: a corpus search here, a model stream
//! opening in the agent. What counts as recoverable is decided by the error
//! type through [`Recoverable`].

use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that may succeed when the same call is repeated later
pub trait Recoverable {
    /// Whether a retry may help
    fn is_recoverable(&self) -> bool;
}

/// Quota and overload markers in an error message
///
/// Matches `429`, `RESOURCE_EXHAUSTED`, `quota` and `rate limit`, the last two
/// case-insensitively.
#[must_use]
pub fn mentions_quota(message: &str) -> bool {
    if message.contains("429") || message.contains("RESOURCE_EXHAUSTED") {
        return true;
    }
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("rate limit")
}

/// Whether an HTTP status signals quota exhaustion or overload
#[inline]
#[must_use]
pub fn is_capacity_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

impl Recoverable for RetrievalError {
    fn is_recoverable(&self) -> bool {
        RetrievalError::is_recoverable(self)
    }
}

/// Retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each retry
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

/// Runs an operation, retrying quota and overload failures
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    /// Create scheduler for a policy
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds, fails for good, or retries run out
    ///
    /// # Errors
    /// The last error once it is not recoverable or retries are exhausted.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: Recoverable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_recoverable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    attempt += 1;
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(attempt, delay_ms, error = %err, "remote busy, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn busy() -> RetrievalError {
        RetrievalError::status_error(429, "quota")
    }

    #[test]
    fn delays_double_from_two_seconds() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..3).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000)
            ]
        );
    }

    #[test]
    fn quota_markers() {
        assert!(mentions_quota("status 429"));
        assert!(mentions_quota("RESOURCE_EXHAUSTED: try later"));
        assert!(mentions_quota("Quota exceeded for project"));
        assert!(mentions_quota("Rate Limit reached"));
        assert!(!mentions_quota("resource_exhausted"));
        assert!(!mentions_quota("syntax error in tsquery"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_429_twice_then_succeeds() {
        let start = Instant::now();
        let attempts = Mutex::new(Vec::new());
        let scheduler = RetryScheduler::default();

        let result = scheduler
            .run(|| {
                let mut seen = attempts.lock().unwrap();
                seen.push(start.elapsed());
                let n = seen.len();
                async move {
                    if n <= 2 {
                        Err(busy())
                    } else {
                        Ok("hits")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "hits");
        let seen = attempts.into_inner().unwrap();
        assert_eq!(
            seen,
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(6)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_retries() {
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = RetryScheduler::default()
            .run(|| {
                *calls.lock().unwrap() += 1;
                async { Err(busy()) }
            })
            .await;
        assert!(result.unwrap_err().is_recoverable());
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn final_errors_are_not_retried() {
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = RetryScheduler::default()
            .run(|| {
                *calls.lock().unwrap() += 1;
                async { Err(RetrievalError::status_error(400, "bad tsquery")) }
            })
            .await;
        assert!(matches!(result, Err(RetrievalError::Status { status: 400, .. })));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
