/// Deadline wrapper for external calls
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error(transparent)]
    Inner(E),
}

/// Bound a fallible future by `deadline`. Exceeding it aborts only this
/// operation; concurrently in-flight calls are unaffected.
pub async fn with_timeout<Fut, T, E>(deadline: Duration, fut: Fut) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Elapsed(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result: Result<u32, TimeoutError<String>> =
            with_timeout(Duration::from_millis(100), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let result: Result<u32, TimeoutError<String>> =
            with_timeout(Duration::from_millis(20), async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(7)
            })
            .await;
        assert!(matches!(result, Err(TimeoutError::Elapsed(_))));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<u32, TimeoutError<&str>> =
            with_timeout(Duration::from_millis(100), async { Err("boom") }).await;
        assert!(matches!(result, Err(TimeoutError::Inner("boom"))));
    }
}
