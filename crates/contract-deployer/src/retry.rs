// Timeout and bounded retry for idempotent reads
// Only downloads and state queries go through here; broadcasts never do.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Retry settings for a class of idempotent operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Timeout for each individual attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff delay for the given retry, capped, with up to 10% jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(2_u64.saturating_pow(retry))
            .min(self.max_backoff.as_millis() as u64);
        let jitter_ms = if delay_ms >= 10 {
            fastrand::u64(0..=delay_ms / 10)
        } else {
            0
        };
        Duration::from_millis(delay_ms + jitter_ms)
    }
}

/// Errors that know whether another attempt could succeed
pub trait Transient {
    fn is_transient(&self) -> bool;

    /// Error value to report when an attempt exceeded its timeout
    fn timed_out(after: Duration) -> Self;
}

/// Run `operation` with a per-attempt timeout, retrying transient failures
/// with exponential backoff
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation_name: &str, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let mut retry = 0;

    loop {
        debug!("Executing '{}' attempt {}/{}", operation_name, retry + 1, policy.max_retries + 1);

        let error = match timeout(policy.timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => error,
            Err(_) => E::timed_out(policy.timeout),
        };

        if !error.is_transient() || retry >= policy.max_retries {
            return Err(error);
        }

        let delay = policy.backoff(retry);
        warn!(
            "'{}' failed (attempt {}/{}): {}, retrying in {:?}",
            operation_name,
            retry + 1,
            policy.max_retries + 1,
            error,
            delay
        );
        sleep(delay).await;
        retry += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Fatal,
        Timeout,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky | TestError::Timeout)
        }

        fn timed_out(_after: Duration) -> Self {
            TestError::Timeout
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<u32, TestError> = with_retry(&fast_policy(3), "flaky", move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(TestError::Flaky)
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), TestError> = with_retry(&fast_policy(3), "fatal", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Fatal)
        })
        .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), TestError> = with_retry(&fast_policy(2), "always-flaky", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Flaky)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            ..fast_policy(0)
        };

        let result: Result<(), TestError> = with_retry(&policy, "slow", || async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(TestError::Timeout)));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
            ..Default::default()
        };

        assert!(policy.backoff(0) >= Duration::from_millis(100));
        assert!(policy.backoff(0) <= Duration::from_millis(110));
        assert!(policy.backoff(10) <= Duration::from_millis(440));
    }
}
