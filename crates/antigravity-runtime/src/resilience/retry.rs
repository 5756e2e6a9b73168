//! Rate-limit retry with exponential backoff.
//!
//! Only [`ProviderError::RateLimited`] is retried. Every other provider
//! error, timeouts included, is returned on first occurrence.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::providers::ProviderError;

/// Backoff schedule for rate-limited provider calls.
///
/// Delays start at `initial_delay` and double, without jitter. With the
/// defaults the schedule is 2s, 4s, 8s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// The backon builder for this schedule.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries)
    }

    /// Sum of every delay when all retries are spent.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|n| self.initial_delay * 2u32.saturating_pow(n as u32))
            .sum()
    }
}

/// Run `operation`, retrying while it reports a rate limit.
///
/// When retries are exhausted the last `RateLimited` error is returned.
pub async fn retry_rate_limited<T, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    operation
        .retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(ProviderError::is_rate_limited)
        .notify(|err: &ProviderError, delay: Duration| {
            tracing::warn!(error = %err, delay = ?delay, "Provider rate limited, backing off");
        })
        .await
}
