//! Retry wrapper for provider calls.
//!
//! Transient failures ([`ProviderError::is_retryable`]) are retried with
//! exponential backoff and jitter. A provider-supplied retry-after delay
//! wins when it is longer than the computed backoff. Cancellation aborts
//! both an in-flight attempt and a pending backoff wait.

use std::future::Future;
use std::time::Duration;

use tabsplit_core::retry::RetryConfig;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::provider::{ProviderError, ProviderResult};

/// Run `op` until it succeeds, fails permanently, exhausts
/// `config.max_retries`, or `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let result = tokio::select! {
            r = op() => r,
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= config.max_retries {
            return Err(err);
        }

        attempt += 1;
        let backoff_ms = config.delay_for_attempt(attempt, rand::random::<f64>());
        let delay_ms = err
            .retry_after_ms()
            .map_or(backoff_ms, |ra| backoff_ms.max(ra));

        metrics::counter!("provider_retries_total", "category" => err.category()).increment(1);
        warn!(
            attempt,
            max_retries = config.max_retries,
            delay_ms,
            category = err.category(),
            error = %err,
            "provider call failed, retrying"
        );

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
