//! Bounded fixed-interval retry
//!
//! Both waiting loops in the publish protocol go through [`RetryPolicy`]:
//! retrying `media_publish` while the platform reports the media as still
//! processing, and polling a container's `status_code` before publishing a
//! reel or video story. Neither loop backs off; they sleep a fixed interval
//! between attempts and stop after `max_attempts`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{GramcastError, PlatformError, Result};

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    /// Done, stop retrying
    Ready(T),
    /// Not done yet; the string describes why (logged)
    Pending(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    /// A policy making at most `max_attempts` attempts (at least one)
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on total time spent sleeping
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Drive `attempt` until it reports [`Poll::Ready`], an error, or the
    /// attempt budget runs out
    ///
    /// Errors returned by `attempt` are terminal and returned as-is. Running
    /// out of attempts yields [`PlatformError::Timeout`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Poll<T>>>,
    {
        for n in 1..=self.max_attempts {
            match attempt(n).await? {
                Poll::Ready(value) => {
                    if n > 1 {
                        info!("{} completed on attempt {}", operation, n);
                    }
                    return Ok(value);
                }
                Poll::Pending(detail) if n < self.max_attempts => {
                    info!(
                        "{} pending ({}), waiting {:?} (attempt {}/{})",
                        operation, detail, self.interval, n, self.max_attempts
                    );
                    sleep(self.interval).await;
                }
                Poll::Pending(detail) => {
                    warn!(
                        "{} still pending after {} attempts: {}",
                        operation, self.max_attempts, detail
                    );
                }
            }
        }

        Err(PlatformError::Timeout {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Retry a call whose "not yet" signal is a transient [`PlatformError`]
    ///
    /// Uses [`PlatformError::is_transient`] as the predicate; every other
    /// error aborts immediately.
    pub async fn retry_transient<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, |_| {
            let fut = call();
            async move {
                match fut.await {
                    Ok(value) => Ok(Poll::Ready(value)),
                    Err(GramcastError::Platform(e)) if e.is_transient() => {
                        Ok(Poll::Pending(e.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let value = instant(3)
            .run("status", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Poll::Ready(42)) }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_then_ready() {
        let value = instant(5)
            .run("status", |n| async move {
                if n < 3 {
                    Ok(Poll::Pending("IN_PROGRESS".to_string()))
                } else {
                    Ok(Poll::Ready(n))
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_timeout_not_infinite_loop() {
        let calls = AtomicU32::new(0);
        let err = instant(4)
            .run::<(), _, _>("publish", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Poll::Pending("processing".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            GramcastError::Platform(PlatformError::Timeout { operation, attempts }) => {
                assert_eq!(operation, "publish");
                assert_eq!(attempts, 4);
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_aborts_without_retry() {
        let calls = AtomicU32::new(0);
        let err = instant(5)
            .run::<(), _, _>("status", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PlatformError::ProcessingFailed("ERROR".to_string()).into()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("Media processing failed"));
    }

    #[tokio::test]
    async fn test_retry_transient_retries_only_processing() {
        let calls = AtomicU32::new(0);
        let value = instant(5)
            .retry_transient("publish", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(PlatformError::Processing("not ready".to_string()).into())
                    } else {
                        Ok("media-1".to_string())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "media-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = AtomicU32::new(0);
        let err = instant(5)
            .retry_transient::<String, _, _>("publish", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PlatformError::Network("connection reset".to_string()).into()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, GramcastError::Platform(PlatformError::Network(_))));
    }

    #[tokio::test]
    async fn test_interval_is_slept_between_attempts_only() {
        let policy = RetryPolicy::new(3, Duration::from_millis(20));
        let start = std::time::Instant::now();
        let _ = policy
            .run::<(), _, _>("status", |_| async { Ok(Poll::Pending("wait".to_string())) })
            .await;
        let elapsed = start.elapsed();

        // Two sleeps for three attempts
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(60) + Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.max_wait(), Duration::from_secs(1));
    }
}
