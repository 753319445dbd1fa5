//! Timeout wrapper for async operations.
//!
//! Resolver adapters wrap their upstream I/O with this guard so a hung
//! source becomes a transient outcome instead of a wedged worker; the
//! pipeline never forcibly kills worker tasks.

use gleaner_core::GleanerError;
use std::time::Duration;

/// Wraps an async operation with a timeout.
pub async fn with_timeout<F, Fut, T>(duration: Duration, f: F) -> Result<T, GleanerError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, GleanerError>>,
{
    tokio::time::timeout(duration, f())
        .await
        .map_err(|_| GleanerError::Timeout(format!("Operation timed out after {:?}", duration)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result =
            with_timeout(Duration::from_secs(1), || async { Ok::<_, GleanerError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_exceeded() {
        let result = with_timeout(Duration::from_millis(10), || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, GleanerError>(42)
        })
        .await;

        assert!(matches!(result, Err(GleanerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result = with_timeout(Duration::from_secs(1), || async {
            Err::<i32, _>(GleanerError::internal("boom"))
        })
        .await;

        assert!(matches!(result, Err(GleanerError::Internal(_))));
    }
}
