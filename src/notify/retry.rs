//! Bounded retry with exponential backoff for chat API calls.
//!
//! Used on role operations during finalization, where a transient network
//! error should not strand a verified member in the restricted role. The
//! budget is deliberately small: three attempts, sub-second backoff, so a
//! dead backend degrades to a logged failure instead of a retry storm.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum retry attempts before giving up.
const MAX_RETRIES: u32 = 3;

/// Maximum backoff between attempts.
const MAX_BACKOFF_MS: u64 = 2_000;

/// Base backoff doubled per attempt.
const BASE_BACKOFF_MS: u64 = 250;

/// Retry an async chat operation with exponential backoff.
///
/// Backoff: 250ms, 500ms, 1000ms (capped at 2s); only errors classified
/// retryable by `is_retryable` are retried.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    is_retryable: fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable(&err) || attempt >= MAX_RETRIES {
                    return Err(err);
                }

                let backoff_ms = (BASE_BACKOFF_MS << attempt).min(MAX_BACKOFF_MS);
                tracing::warn!(attempt = attempt + 1, backoff_ms, "retrying chat operation");
                sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}
