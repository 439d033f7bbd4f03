use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Bounded retry with exponential backoff for remote reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Retry without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying retryable errors until the attempt budget is spent.
    ///
    /// Non-retryable errors are returned immediately. When retries run out
    /// the last error is wrapped in [`Error::RetriesExhausted`].
    pub fn run<T>(&self, operation: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(Error::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote read failed, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result = policy.run("fetch", || {
            calls += 1;
            if calls < 3 {
                Err(Error::TransientFetch("timeout".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_exhaustion_returns_typed_error() {
        let policy = RetryPolicy::immediate(2);
        let mut calls = 0;
        let result: Result<()> = policy.run("count", || {
            calls += 1;
            Err(Error::TransientFetch("connection refused".into()))
        });

        assert_eq!(calls, 2);
        match result.unwrap_err() {
            Error::RetriesExhausted {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "count");
                assert_eq!(attempts, 2);
                assert!(last.is_retryable());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_non_retryable_error_is_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0;
        let result: Result<()> = policy.run("fetch", || {
            calls += 1;
            Err(Error::InvalidRange {
                start: 5,
                end: 3,
                count: 10,
            })
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }
}
