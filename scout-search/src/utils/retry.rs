//! Retry and backoff helpers
//!
//! Delay computation is a pure function so schedulers and tests can reason about
//! it without sleeping. Sleeping is done by the callers.

use std::time::{Duration, Instant};
use scout_common::{Error, Result};

/// Exponential backoff delay for a retry attempt
///
/// `attempt` is zero-based: the first retry waits `base_ms`, the second
/// `base_ms * 2`, and so on. Saturates instead of overflowing.
///
/// ```
/// use scout_search::utils::retry_delay_ms;
///
/// assert_eq!(retry_delay_ms(1000, 0), 1000);
/// assert_eq!(retry_delay_ms(1000, 3), 8000);
/// ```
pub fn retry_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt))
}

/// Bounded exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_millis(retry_delay_ms(self.base_delay_ms, retry))
    }
}

/// Retry a database operation while SQLite reports a lock, until `max_wait_ms` elapses
///
/// Backoff starts at 10ms and doubles up to 1s. Any error other than a lock
/// error is returned immediately.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_lock_error(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt + 1,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                let backoff_ms = retry_delay_ms(10, attempt).min(1000);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => db_err.to_string().contains("database is locked"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay_ms(1000, 0), 1000);
        assert_eq!(retry_delay_ms(1000, 1), 2000);
        assert_eq!(retry_delay_ms(1000, 2), 4000);
        assert_eq!(retry_delay_ms(250, 4), 4000);
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert_eq!(retry_delay_ms(1000, 200), u64::MAX);
        assert_eq!(retry_delay_ms(0, 5), 0);
    }

    #[test]
    fn test_policy_attempts() {
        let policy = RetryPolicy::new(3, 1000);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay(2), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retry_on_lock_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let mut attempts = 0;

        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async move { Err::<i32, Error>(Error::Internal("other error".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
