//! `ResilientInvoker`: the circuit breaker + retry composition external calls go
//! through (§4.8 `invoke(resource, callable)`).

use std::sync::Arc;

use dashmap::DashMap;
use event_model::Classify;
use tracing::debug;

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::InvokeError;
use crate::retry::{retry, RetryOutcome, RetryPolicy};

/// Per-resource breaker registry, handed out by name so callers don't have to thread
/// a `CircuitBreaker` reference through every call site.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, resource: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(resource, config.clone())))
            .clone()
    }
}

/// Wraps a retry policy and a circuit-breaker registry around external calls. Each
/// retry attempt is individually admitted and scored by the resource's breaker, so a
/// breaker trip mid-retry stops further attempts without waiting out the backoff.
pub struct ResilientInvoker {
    registry: Arc<CircuitBreakerRegistry>,
    circuit_config: CircuitBreakerConfig,
    retry_policy: RetryPolicy,
}

impl ResilientInvoker {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, circuit_config: CircuitBreakerConfig, retry_policy: RetryPolicy) -> Self {
        Self { registry, circuit_config, retry_policy }
    }

    /// Per §4.8: returns the call's result, or fails with `CIRCUIT_OPEN`, the
    /// underlying error (non-retryable), or `RETRIES_EXHAUSTED`.
    pub async fn invoke<F, Fut, T, E>(&self, resource: &str, mut op: F) -> Result<T, InvokeError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Classify,
    {
        let breaker = self.registry.get_or_create(resource, &self.circuit_config);

        let outcome = retry(&self.retry_policy, |attempt| {
            let breaker = breaker.clone();
            let fut = op();
            async move {
                debug!(resource, attempt, "resilient invoke attempt");
                breaker.call(|| fut).await
            }
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded(value) => Ok(value),
            RetryOutcome::NonRetryable(InvokeError::CircuitOpen { resource }) => {
                Err(InvokeError::CircuitOpen { resource })
            }
            RetryOutcome::NonRetryable(InvokeError::NonRetryable { resource, source }) => {
                Err(InvokeError::NonRetryable { resource, source })
            }
            RetryOutcome::NonRetryable(InvokeError::RetriesExhausted { resource, attempts, source }) => {
                Err(InvokeError::RetriesExhausted { resource, attempts, source })
            }
            RetryOutcome::Exhausted { last, attempts } => match last {
                InvokeError::CircuitOpen { resource } => Err(InvokeError::CircuitOpen { resource }),
                InvokeError::NonRetryable { resource, source } => {
                    Err(InvokeError::RetriesExhausted { resource, attempts, source })
                }
                InvokeError::RetriesExhausted { resource, source, .. } => {
                    Err(InvokeError::RetriesExhausted { resource, attempts, source })
                }
            },
        }
    }
}
