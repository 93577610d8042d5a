//! Single-retry wrapper for safe operations.
//!
//! Transient connection errors are retried exactly once, and only on
//! idempotent reads and upserts. Non-idempotent inserts are never
//! retried.

use std::future::Future;

use tracing::debug;

use anima_core::errors::AnimaResult;

/// Run `op`, retrying once when it fails with a retryable error.
pub async fn retry_once<T, F, Fut>(op: F) -> AnimaResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AnimaResult<T>>,
{
    match op().await {
        Err(e) if e.is_retryable() => {
            debug!(error = %e, "transient database error, retrying once");
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anima_core::errors::AnimaError;

    use super::*;

    #[tokio::test]
    async fn retries_transient_errors_once() {
        let attempts = AtomicUsize::new(0);
        let result = retry_once(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AnimaError::database_retryable("connection reset"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_second_failure() {
        let attempts = AtomicUsize::new(0);
        let result: AnimaResult<()> = retry_once(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AnimaError::database_retryable("still down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result: AnimaResult<()> = retry_once(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AnimaError::database("constraint violated"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
