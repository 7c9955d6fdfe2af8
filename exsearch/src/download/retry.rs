//! Bounded retry for downloader requests.
//!
//! Only errors that [`DownloadError::is_retryable`] accepts are retried. The
//! final attempt's error is returned unchanged.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::DownloadError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base
    #[default]
    Constant,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base * 2^retry
    Exponential,
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: usize,
    /// Base delay between attempts.
    pub delay: Duration,
    /// Delay growth.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(0, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// No retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Constant delay between attempts.
    #[must_use]
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: BackoffStrategy::Constant,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total attempts, the first one included.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let factor = match self.backoff {
            BackoffStrategy::Constant => 1,
            BackoffStrategy::Linear => u32::try_from(retry).unwrap_or(u32::MAX).saturating_add(1),
            BackoffStrategy::Exponential => {
                2u32.saturating_pow(u32::try_from(retry).unwrap_or(u32::MAX))
            }
        };
        self.delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut operation: F,
) -> Result<T, DownloadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                retry += 1;
                tracing::debug!(
                    url,
                    attempt = retry,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying download"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_strategies() {
        let base = Duration::from_millis(100);
        let constant = RetryPolicy::fixed(3, base);
        assert_eq!(constant.delay_for(5), base);

        let linear = RetryPolicy::fixed(3, base).with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let exp = RetryPolicy::fixed(3, base)
            .with_backoff(BackoffStrategy::Exponential)
            .with_max_delay(Duration::from_millis(500));
        assert_eq!(exp.delay_for(1), Duration::from_millis(200));
        assert_eq!(exp.delay_for(10), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::fixed(2, Duration::from_secs(1));

        let counter = calls.clone();
        let result = with_retry(&policy, "https://a.example/", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DownloadError::Transport("reset".into()))
                } else {
                    Ok("body")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_attempt_error_is_returned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::fixed(1, Duration::from_secs(1));

        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&policy, "https://a.example/", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::Status {
                    status: 500 + u16::try_from(n).unwrap(),
                    url: "https://a.example/".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(DownloadError::Status { status: 501, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::fixed(5, Duration::from_secs(1));

        let counter = calls.clone();
        let result: Result<(), _> = with_retry(&policy, "https://a.example/", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::InvalidResponse("not json".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
