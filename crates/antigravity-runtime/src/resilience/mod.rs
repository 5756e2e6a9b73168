//! Resilience patterns for antigravity-runtime.
//!
//! This module provides:
//! - Retry with exponential backoff on provider rate limits
//! - Upper-bound timeouts on provider calls

mod retry;

pub use retry::{retry_rate_limited, RetryPolicy};

use std::future::Future;
use std::time::Duration;

use crate::providers::ProviderError;

/// Bound a provider call. Expiry becomes [`ProviderError::Timeout`].
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Timeout(d)) if d == Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let result = with_timeout(Duration::from_secs(30), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
