/// Circuit breaker with a rolling failure window and a single-probe half-open
/// phase.
///
/// State transitions:
/// - Closed → Open: failure count inside the rolling window reaches the threshold
/// - Open → HalfOpen: after the current cool-down elapses; exactly one trial
///   call is admitted
/// - HalfOpen → Closed: the trial call succeeds
/// - HalfOpen → Open: the trial call fails; the cool-down doubles, capped at
///   `max_cooldown`
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Destination excluded, calls fail fast
    Open,
    /// One trial call allowed to test recovery
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside the rolling window that open the circuit
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted
    pub window: Duration,
    /// Cool-down before the first Open → HalfOpen transition
    pub initial_cooldown: Duration,
    /// Upper bound for the exponentially growing cool-down
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(30),
            initial_cooldown: Duration::from_secs(10),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<BreakerState>>,
}

struct BreakerState {
    current: CircuitState,
    /// Timestamps of recent failures, pruned to the rolling window
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    cooldown: Duration,
    /// Whether the single half-open trial is already in flight
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(BreakerState {
                current: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                cooldown: config.initial_cooldown,
                probe_in_flight: false,
            })),
            config,
        }
    }

    /// Ask for permission to attempt a call.
    ///
    /// Returns `false` while the circuit is open or while the half-open trial
    /// is already in flight. A `true` from a half-open circuit consumes the
    /// trial slot; the caller must follow up with `record_success` or
    /// `record_failure`.
    pub fn try_permit(&self) -> bool {
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= state.cooldown {
                    info!("Circuit breaker: Open -> HalfOpen");
                    state.current = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    false
                } else {
                    state.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write();
        match state.current {
            CircuitState::HalfOpen => {
                info!("Circuit breaker: HalfOpen -> Closed");
                state.current = CircuitState::Closed;
                state.failures.clear();
                state.opened_at = None;
                state.cooldown = self.config.initial_cooldown;
                state.probe_in_flight = false;
            }
            CircuitState::Closed => {
                // Successes age failures out of the window naturally; nothing
                // to reset here.
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.write();

        match state.current {
            CircuitState::Closed => {
                state.failures.push_back(now);
                self.prune_window(&mut state, now);

                if state.failures.len() as u32 >= self.config.failure_threshold {
                    warn!(
                        failures = state.failures.len(),
                        "Circuit breaker: Closed -> Open"
                    );
                    state.current = CircuitState::Open;
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                let next = (state.cooldown * 2).min(self.config.max_cooldown);
                warn!(cooldown_secs = next.as_secs(), "Circuit breaker: HalfOpen -> Open");
                state.current = CircuitState::Open;
                state.opened_at = Some(now);
                state.cooldown = next;
                state.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    fn prune_window(&self, state: &mut BreakerState, now: Instant) {
        while let Some(front) = state.failures.front() {
            if now.duration_since(*front) > self.config.window {
                state.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            window: Duration::from_secs(30),
            initial_cooldown: Duration::from_millis(100),
            max_cooldown: Duration::from_millis(800),
        }
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(fast_config());

        for _ in 0..5 {
            assert!(cb.try_permit());
            cb.record_failure();
        }

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_permit());
    }

    #[test]
    fn test_failures_below_threshold_stay_closed() {
        let cb = CircuitBreaker::new(fast_config());

        for _ in 0..4 {
            assert!(cb.try_permit());
            cb.record_failure();
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_permit());
    }

    #[tokio::test]
    async fn test_single_probe_in_half_open() {
        let cb = CircuitBreaker::new(fast_config());

        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Exactly one trial request is admitted
        assert!(cb.try_permit());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.try_permit());
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let cb = CircuitBreaker::new(fast_config());

        for _ in 0..5 {
            cb.record_failure();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cb.try_permit());
        cb.record_success();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_permit());
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_with_longer_cooldown() {
        let cb = CircuitBreaker::new(fast_config());

        for _ in 0..5 {
            cb.record_failure();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cb.try_permit());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Cool-down doubled to 200ms: still open after the original 100ms
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!cb.try_permit());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cb.try_permit());
    }

    #[tokio::test]
    async fn test_cooldown_is_capped() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            window: Duration::from_secs(30),
            initial_cooldown: Duration::from_millis(50),
            max_cooldown: Duration::from_millis(100),
        };
        let cb = CircuitBreaker::new(config);

        // Open, then fail the probe several times; cool-down must not exceed
        // the cap.
        cb.record_failure();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(120)).await;
            assert!(cb.try_permit(), "probe should be admitted after the cap");
            cb.record_failure();
        }
    }
}
