//! Per-resource circuit breaker (§4.8): CLOSED / OPEN / HALF_OPEN, tripped by a
//! sliding-window failure rate rather than a raw consecutive-failure count, grounded
//! in `circuit-breaker-lib`'s state machine but generalized to the spec's thresholds.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::InvokeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub min_calls: usize,
    pub open_duration: Duration,
    pub probe_count: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 10,
            min_calls: 10,
            open_duration: Duration::from_secs(30),
            probe_count: 1,
        }
    }
}

struct Window {
    capacity: usize,
    outcomes: VecDeque<bool>,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), outcomes: VecDeque::new() }
    }

    fn record(&mut self, success: bool) {
        if self.outcomes.len() >= self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }
}

struct Inner {
    state: CircuitState,
    window: Window,
    opened_at: Option<Instant>,
    half_open_admitted: usize,
    half_open_successes: usize,
}

/// A single named resource's breaker. Cloneable handles share state; the registry
/// hands out one per resource name.
pub struct CircuitBreaker {
    resource: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Whether an admitted call counts toward the HALF_OPEN probe budget.
struct Admission {
    is_probe: bool,
}

impl CircuitBreaker {
    pub fn new(resource: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = Window::new(config.sliding_window_size);
        Self {
            resource: resource.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_admitted: 0,
                half_open_successes: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn admit<E>(&self) -> Result<Admission, InvokeError<E>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission { is_probe: false }),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_duration {
                    info!(resource = %self.resource, "circuit transitioning to half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_admitted = 1;
                    inner.half_open_successes = 0;
                    Ok(Admission { is_probe: true })
                } else {
                    Err(InvokeError::CircuitOpen { resource: self.resource.clone() })
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted < self.config.probe_count {
                    inner.half_open_admitted += 1;
                    Ok(Admission { is_probe: true })
                } else {
                    Err(InvokeError::CircuitOpen { resource: self.resource.clone() })
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.window.record(true);
        if admission.is_probe {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.probe_count {
                info!(resource = %self.resource, "circuit closed after successful probes");
                inner.state = CircuitState::Closed;
                inner.window = Window::new(self.config.sliding_window_size);
                inner.opened_at = None;
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.window.record(false);
        if admission.is_probe {
            warn!(resource = %self.resource, "half-open probe failed, circuit re-opening");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        if inner.window.outcomes.len() >= self.config.min_calls
            && inner.window.failure_rate() >= self.config.failure_rate_threshold
        {
            warn!(resource = %self.resource, rate = inner.window.failure_rate(), "circuit opened");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Runs `op` under this breaker's admission control. Does not retry; see
    /// [`crate::ResilientInvoker`] for the retry-composed entry point.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, InvokeError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        match op().await {
            Ok(value) => {
                self.on_success(admission);
                Ok(value)
            }
            Err(err) => {
                self.on_failure(admission);
                Err(InvokeError::NonRetryable { resource: self.resource.clone(), source: err })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            sliding_window_size: 10,
            min_calls: 10,
            open_duration: Duration::from_millis(50),
            probe_count: 1,
        }
    }

    #[tokio::test]
    async fn trips_open_after_failure_rate_threshold_with_min_calls() {
        let breaker = CircuitBreaker::new("order-service", config());
        for _ in 0..10 {
            let _ = breaker.call(|| async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap_err();
        assert!(matches!(err, InvokeError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let breaker = CircuitBreaker::new("order-service", config());
        for _ in 0..10 {
            let _ = breaker.call(|| async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let ok = breaker.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(ok.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new("order-service", config());
        for _ in 0..10 {
            let _ = breaker.call(|| async { Err::<(), &str>("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let _ = breaker.call(|| async { Err::<(), &str>("still down") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn low_call_count_does_not_trip_even_at_100pct_failure() {
        let breaker = CircuitBreaker::new("order-service", config());
        for _ in 0..3 {
            let _ = breaker.call(|| async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
