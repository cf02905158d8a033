use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::deadline::Deadline;
use crate::metrics::{record_circuit_breaker_state, record_circuit_breaker_transition};

pub use crate::metrics::CircuitBreakerState;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// How long the circuit stays open before letting a trial call through
    pub half_open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitBreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for calls to a backend that may be unreachable.
///
/// Calls are bounded by the caller's [`Deadline`] rather than a fixed
/// timeout. A deadline that expires during the call counts as a failure;
/// one that had already expired on arrival is rejected without touching the
/// backend or the failure count.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerState>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    Open,

    #[error("Call timed out")]
    Timeout,

    #[error("Call failed: {0}")]
    CallFailed(E),
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        record_circuit_breaker_state(&name, CircuitBreakerState::Closed);

        Self {
            name,
            config,
            inner: RwLock::new(BreakerState {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` under the breaker, aborting it when `deadline` passes
    pub async fn call<F, T, E>(&self, deadline: Deadline, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if deadline.is_expired() {
            tracing::debug!(service = %self.name, "Circuit breaker call arrived past its deadline");
            return Err(CircuitBreakerError::Timeout);
        }

        if !self.allow_request().await {
            return Err(CircuitBreakerError::Open);
        }

        let start = Instant::now();
        match deadline.run(f).await {
            Ok(Ok(value)) => {
                self.on_success().await;
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure().await;
                tracing::warn!(
                    service = %self.name,
                    duration_ms = %start.elapsed().as_millis(),
                    "Circuit breaker call failed"
                );
                Err(CircuitBreakerError::CallFailed(err))
            }
            Err(_) => {
                self.on_failure().await;
                tracing::warn!(
                    service = %self.name,
                    duration_ms = %start.elapsed().as_millis(),
                    "Circuit breaker call hit its deadline"
                );
                Err(CircuitBreakerError::Timeout)
            }
        }
    }

    /// Returns true if the call should proceed
    async fn allow_request(&self) -> bool {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.half_open_timeout)
                    .unwrap_or(true);

                if cooled_down {
                    self.transition(&mut inner, CircuitBreakerState::HalfOpen);
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitBreakerState::Closed => {
                inner.failure_count = 0;
            }
            CircuitBreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Closed);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                }
            }
            CircuitBreakerState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitBreakerState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Open);
                    tracing::warn!(service = %self.name, failures = inner.failure_count, "Circuit breaker opened");
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.transition(&mut inner, CircuitBreakerState::Open);
                inner.failure_count = 1;
                tracing::warn!(service = %self.name, "Circuit breaker reopened from HalfOpen");
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitBreakerState) {
        let from = inner.state;
        inner.state = to;
        record_circuit_breaker_transition(&self.name, from, to);
        record_circuit_breaker_state(&self.name, to);
        tracing::info!(service = %self.name, from = ?from, to = ?to, "Circuit breaker transition");
    }

    pub async fn get_state(&self) -> CircuitBreakerState {
        self.inner.read().await.state
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitBreakerState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        record_circuit_breaker_state(&self.name, CircuitBreakerState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("Test error")]
    struct TestError;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_circuit_breaker_success() {
        let cb = CircuitBreaker::new("test-service", CircuitBreakerConfig::default());

        let result = cb.call(deadline(), async { Ok::<_, TestError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_circuit_breaker_failure() {
        let cb = CircuitBreaker::new("test-service", CircuitBreakerConfig::default());

        let result = cb.call(deadline(), async { Err::<i32, _>(TestError) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CallFailed(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_deadline() {
        let cb = CircuitBreaker::new("test-service", CircuitBreakerConfig::default());

        let result = cb
            .call(Deadline::after(Duration::from_millis(50)), async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<_, TestError>(42)
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout)));
    }

    #[tokio::test]
    async fn test_expired_deadline_does_not_trip_breaker() {
        let cb = CircuitBreaker::new(
            "test-service",
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            },
        );

        for _ in 0..5 {
            let result = cb
                .call(Deadline::after(Duration::ZERO), async { Ok::<_, TestError>(1) })
                .await;
            assert!(matches!(result, Err(CircuitBreakerError::Timeout)));
        }

        assert_eq!(cb.get_state().await, CircuitBreakerState::Closed);
        tokio_test::assert_ok!(cb.call(deadline(), async { Ok::<_, TestError>(2) }).await);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = CircuitBreaker::new(
            "test-service",
            CircuitBreakerConfig {
                failure_threshold: 3,
                ..Default::default()
            },
        );

        for _ in 0..3 {
            let _ = cb.call(deadline(), async { Err::<i32, _>(TestError) }).await;
        }

        assert_eq!(cb.get_state().await, CircuitBreakerState::Open);

        let result = cb.call(deadline(), async { Ok::<_, TestError>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn test_circuit_breaker_half_open_recovers() {
        let cb = CircuitBreaker::new(
            "test-service",
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                half_open_timeout: Duration::from_millis(10),
            },
        );

        let _ = cb.call(deadline(), async { Err::<i32, _>(TestError) }).await;
        assert_eq!(cb.get_state().await, CircuitBreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = cb.call(deadline(), async { Ok::<_, TestError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.get_state().await, CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_reset() {
        let cb = CircuitBreaker::new(
            "test-service",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
        );

        let _ = cb.call(deadline(), async { Err::<i32, _>(TestError) }).await;
        assert_eq!(cb.get_state().await, CircuitBreakerState::Open);

        cb.reset().await;

        tokio_test::assert_ok!(cb.call(deadline(), async { Ok::<_, TestError>(42) }).await);
    }
}
