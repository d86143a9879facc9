/// Bounded retry for transient storage failures
///
/// Check-then-act sequences (role changes, invitation responses, quota-guarded
/// inserts) run in one transaction that re-reads current state on every attempt,
/// so re-running the whole transaction after a serialization failure or deadlock
/// is safe. Denials, validation errors and conflicts are never retried.
///
/// # Example
///
/// ```no_run
/// use statusguard_shared::db::retry::{with_retry, RetryPolicy};
/// use statusguard_shared::error::Result;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<()> {
/// let policy = RetryPolicy::default();
/// let pool = &pool;
/// let count: i64 = with_retry(&policy, "count_users", || async move {
///     let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
///         .fetch_one(pool)
///         .await?;
///     Ok(count)
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Result;

/// Retry configuration for transient storage errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,

    /// Backoff multiplier (2.0 doubles the delay each attempt)
    pub backoff_multiplier: f64,

    /// Scale each delay by a random factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff for retry number `attempt` (0-indexed), before jitter
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        if !self.jitter {
            return base;
        }
        base.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt budget is spent
///
/// # Arguments
///
/// * `policy` - Retry budget and backoff shape
/// * `operation` - Name used in log lines
/// * `op` - Produces a fresh future for each attempt
///
/// # Errors
///
/// Returns the first non-transient error, or the last transient error once
/// `max_attempts` is reached.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient storage error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Denial, Error};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(20));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(40));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(80));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(20));
            assert!(delay <= Duration::from_millis(40));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&fast_policy(2), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Database(sqlx::Error::PoolTimedOut))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_denials_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&fast_policy(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Denial::Forbidden.into())
        })
        .await;

        assert_eq!(result.unwrap_err().denial(), Some(&Denial::Forbidden));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);

        let _: Result<()> = with_retry(&fast_policy(0), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Database(sqlx::Error::PoolTimedOut))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
