/// Retry with exponential backoff and jitter for transient failures
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per retry
    pub initial_backoff: Duration,
    /// Upper bound on the backoff
    pub max_backoff: Duration,
    /// Randomize each delay by ±30%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            jitter: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Run `f` until it succeeds or the retry budget is spent.
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = config.initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt == config.max_retries {
                    warn!(attempts = attempt + 1, "Retry budget exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }

                let delay = if config.jitter {
                    let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
                    Duration::from_millis((backoff.as_millis() as f64 * factor) as u64)
                } else {
                    backoff
                };

                warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;

                backoff = (backoff * 2).min(config.max_backoff);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = with_retry(quick(3), move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = with_retry(quick(3), move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("temporary")
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = with_retry(quick(2), move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>("persistent") }
        })
        .await;

        match result {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3); // initial + 2 retries
                assert_eq!(last_error, "persistent");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
