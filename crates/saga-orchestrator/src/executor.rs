use std::sync::Arc;

use resilience::{retry, RetryOutcome};
use saga_store::{SagaStatus, SagaStore};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::error::{SagaOrchestratorError, StepError};

/// Drives a [`SagaDefinition`] through D in-process (§4.6): forward steps execute in
/// order under their own retry policy and timeout, merging their delta into the
/// shared context; a failed step triggers reverse-order compensation of every step
/// that already completed.
pub struct SagaOrchestrator {
    store: Arc<dyn SagaStore>,
}

impl SagaOrchestrator {
    pub fn new(store: Arc<dyn SagaStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SagaStore> {
        &self.store
    }

    /// Runs `definition` to completion or exhaustion. Returns the allocated saga id
    /// regardless of whether the saga ended up `COMPLETED` or `COMPENSATED`; only a
    /// compensation failure (operator intervention required) is an `Err`.
    pub async fn execute(
        &self,
        definition: &SagaDefinition,
        correlation_id: Option<Uuid>,
        initial_context: Value,
    ) -> Result<Uuid, SagaOrchestratorError> {
        let saga_id = Uuid::new_v4();
        self.store
            .start(
                saga_id,
                &definition.saga_type,
                correlation_id,
                definition.steps.len() as u32,
                definition.total_timeout,
            )
            .await?;
        let ctx = SagaContext::new(initial_context);
        let mut completed: Vec<usize> = Vec::new();

        for (index, step) in definition.steps.iter().enumerate() {
            let outcome = retry(&step.retry_policy, |_attempt| async {
                match tokio::time::timeout(step.timeout, step.forward.execute(&ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StepError::Timeout(step.timeout)),
                }
            })
            .await;

            match outcome {
                RetryOutcome::Succeeded(delta) => {
                    ctx.merge_delta(delta);
                    self.store
                        .record_step_completed(saga_id, index as u32, &step.event_type, &step.service, Uuid::new_v4())
                        .await?;
                    completed.push(index);
                }
                RetryOutcome::NonRetryable(err) | RetryOutcome::Exhausted { last: err, .. } => {
                    let reason = err.to_string();
                    warn!(%saga_id, step = %step.name, reason = %reason, "saga step failed, beginning compensation");
                    self.store
                        .record_step_failed(saga_id, index as u32, &step.event_type, &step.service, &reason)
                        .await?;
                    return self.compensate(saga_id, definition, &ctx, &completed).await;
                }
            }
        }

        let saga = self.store.complete(saga_id, SagaStatus::Completed).await?;
        info!(%saga_id, saga_type = %definition.saga_type, status = ?saga.status, "saga completed");
        Ok(saga_id)
    }

    /// Entry point used by the timeout scheduler's orchestrated compensation trigger
    /// (§4.7 step 3): compensates `completed` against a freshly reconstructed
    /// context, since the saga's original forward-execution context does not
    /// survive past `execute` returning.
    pub async fn compensate_timed_out(
        &self,
        saga_id: Uuid,
        definition: &SagaDefinition,
        ctx: &SagaContext,
        completed: &[usize],
    ) -> Result<Uuid, SagaOrchestratorError> {
        self.compensate(saga_id, definition, ctx, completed).await
    }

    /// Reverse-order compensation of every step in `completed` (§4.6 step 3). A
    /// compensation action failing after its own retry budget is exhausted leaves the
    /// saga `FAILED` with partial compensation: §8 calls this out as requiring
    /// operator replay rather than an automatic retry, since a failing compensation
    /// usually means the forward effect it's trying to undo no longer matches what
    /// the compensation expects.
    async fn compensate(
        &self,
        saga_id: Uuid,
        definition: &SagaDefinition,
        ctx: &SagaContext,
        completed: &[usize],
    ) -> Result<Uuid, SagaOrchestratorError> {
        for &index in completed.iter().rev() {
            let step = &definition.steps[index];
            let outcome = retry(&step.retry_policy, |_attempt| async {
                match tokio::time::timeout(step.timeout, step.compensation.compensate(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StepError::Timeout(step.timeout)),
                }
            })
            .await;

            match outcome {
                RetryOutcome::Succeeded(()) => {
                    self.store
                        .record_compensation_step(saga_id, index as u32, &step.compensating_event_type, &step.service)
                        .await?;
                }
                RetryOutcome::NonRetryable(err) | RetryOutcome::Exhausted { last: err, .. } => {
                    let reason = err.to_string();
                    error!(%saga_id, step = %step.name, reason = %reason, "compensation failed, operator intervention required");
                    if let Err(store_err) = self.store.complete(saga_id, SagaStatus::Failed).await {
                        warn!(%saga_id, error = %store_err, "failed to mark saga FAILED after compensation failure");
                    }
                    return Err(SagaOrchestratorError::CompensationFailed { saga_id, step: step.name.clone(), reason });
                }
            }
        }

        info!(%saga_id, "saga fully compensated");
        Ok(saga_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use saga_store::InMemorySagaStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::step::{CompensationAction, ForwardAction, SagaStep};

    struct OkForward(&'static str);
    #[async_trait]
    impl ForwardAction for OkForward {
        async fn execute(&self, _ctx: &SagaContext) -> Result<Value, StepError> {
            Ok(serde_json::json!({ self.0: true }))
        }
    }

    struct FailForward;
    #[async_trait]
    impl ForwardAction for FailForward {
        async fn execute(&self, _ctx: &SagaContext) -> Result<Value, StepError> {
            Err(StepError::non_retryable("declined"))
        }
    }

    struct CountingCompensation(Arc<AtomicUsize>);
    #[async_trait]
    impl CompensationAction for CountingCompensation {
        async fn compensate(&self, _ctx: &SagaContext) -> Result<(), StepError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingCompensation;
    #[async_trait]
    impl CompensationAction for FailingCompensation {
        async fn compensate(&self, _ctx: &SagaContext) -> Result<(), StepError> {
            Err(StepError::non_retryable("cannot undo"))
        }
    }

    fn noop_compensation() -> Arc<dyn CompensationAction> {
        Arc::new(CountingCompensation(Arc::new(AtomicUsize::new(0))))
    }

    #[tokio::test]
    async fn all_steps_succeed_marks_saga_completed() {
        let store: Arc<dyn SagaStore> = Arc::new(InMemorySagaStore::new());
        let orchestrator = SagaOrchestrator::new(store.clone());

        let steps = vec![
            SagaStep::new("reserve_stock", "inventory", "StockReserved", "StockReleased", Arc::new(OkForward("reserved")), noop_compensation()),
            SagaStep::new("charge_payment", "payments", "PaymentProcessed", "PaymentRefunded", Arc::new(OkForward("charged")), noop_compensation()),
        ];
        let definition = SagaDefinition::new("OrderFulfillment", steps);

        let saga_id = orchestrator.execute(&definition, None, serde_json::json!({"order_id": "o1"})).await.unwrap();
        let saga = store.get(saga_id).await.unwrap();
        assert_eq!(saga.status, SagaStatus::Completed);
    }

    #[tokio::test]
    async fn failed_step_compensates_prior_completed_steps_in_reverse_order() {
        let store: Arc<dyn SagaStore> = Arc::new(InMemorySagaStore::new());
        let orchestrator = SagaOrchestrator::new(store.clone());
        let compensated = Arc::new(AtomicUsize::new(0));

        let steps = vec![
            SagaStep::new(
                "reserve_stock",
                "inventory",
                "StockReserved",
                "StockReleased",
                Arc::new(OkForward("reserved")),
                Arc::new(CountingCompensation(compensated.clone())),
            ),
            SagaStep::new("charge_payment", "payments", "PaymentProcessed", "PaymentRefunded", Arc::new(FailForward), noop_compensation())
                .with_retry_policy(resilience::RetryPolicy { max_retries: 0, ..Default::default() }),
        ];
        let definition = SagaDefinition::new("OrderFulfillment", steps);

        let saga_id = orchestrator.execute(&definition, None, serde_json::json!({"order_id": "o1"})).await.unwrap();
        let saga = store.get(saga_id).await.unwrap();
        assert_eq!(saga.status, SagaStatus::Compensated);
        assert_eq!(compensated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compensation_failure_marks_saga_failed_and_returns_err() {
        let store: Arc<dyn SagaStore> = Arc::new(InMemorySagaStore::new());
        let orchestrator = SagaOrchestrator::new(store.clone());

        let steps = vec![
            SagaStep::new("reserve_stock", "inventory", "StockReserved", "StockReleased", Arc::new(OkForward("reserved")), Arc::new(FailingCompensation))
                .with_retry_policy(resilience::RetryPolicy { max_retries: 0, ..Default::default() }),
            SagaStep::new("charge_payment", "payments", "PaymentProcessed", "PaymentRefunded", Arc::new(FailForward), noop_compensation())
                .with_retry_policy(resilience::RetryPolicy { max_retries: 0, ..Default::default() }),
        ];
        let definition = SagaDefinition::new("OrderFulfillment", steps);

        let err = orchestrator.execute(&definition, None, serde_json::json!({"order_id": "o1"})).await.unwrap_err();
        assert!(matches!(err, SagaOrchestratorError::CompensationFailed { .. }));

        let saga_id = match err {
            SagaOrchestratorError::CompensationFailed { saga_id, .. } => saga_id,
            _ => unreachable!(),
        };
        let saga = store.get(saga_id).await.unwrap();
        assert_eq!(saga.status, SagaStatus::Failed);
    }
}
