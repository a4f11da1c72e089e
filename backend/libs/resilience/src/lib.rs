/// Resilience patterns shared by the platform services
///
/// - **Circuit Breaker**: per-destination failure tracker that fails fast
///   while a destination is considered unhealthy
/// - **Retry**: exponential backoff with jitter for transient failures
/// - **Timeout**: time limits on external calls
pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
