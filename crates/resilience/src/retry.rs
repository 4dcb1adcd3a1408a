//! Retry with exponential backoff and jitter, classification-aware (§4.8/§7):
//! attempts = 1 + `max_retries`; failures classified [`event_model::FailureClass`]
//! non-retryable skip further attempts immediately.

use std::time::Duration;

use event_model::{Classify, FailureClass};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-indexed retry count, i.e. the delay before
    /// the *second* call overall is `backoff_for(1)`).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32 - 1);
        let jitter = if self.jitter_ratio > 0.0 {
            let span = base * self.jitter_ratio;
            rand::thread_rng().gen_range(-span..=span)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}

/// What happened to a retried call.
pub enum RetryOutcome<T, E> {
    Succeeded(T),
    /// Classified non-retryable: returned on the first such failure, no further
    /// attempts made.
    NonRetryable(E),
    /// Retryable but `max_retries` exhausted.
    Exhausted { last: E, attempts: u32 },
}

/// Runs `op` up to `1 + policy.max_retries` times, sleeping `policy.backoff_for`
/// between attempts, stopping early on a non-retryable classification.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Classify,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(err) => {
                let retryable = matches!(
                    err.classify(),
                    FailureClass::Transient | FailureClass::Storage
                );
                if !retryable {
                    return RetryOutcome::NonRetryable(err);
                }
                if attempt > policy.max_retries {
                    return RetryOutcome::Exhausted { last: err, attempts: attempt };
                }
                tokio::time::sleep(policy.backoff_for(attempt)).await;
            }
        }
    }
}
