use async_trait::async_trait;
use saga_store::SagaInstance;

use crate::error::SchedulerError;

/// Hook invoked once a saga has been CAS'd into `COMPENSATING` with a `TIMEOUT`
/// failure reason (§4.7 step 3). An orchestrated deployment implements this by
/// running the orchestrator's reverse-order compensation protocol in-process; a
/// choreographed deployment implements it by publishing the saga type's
/// timeout-compensating event onto the bus and letting participants react.
#[async_trait]
pub trait CompensationTrigger: Send + Sync {
    async fn trigger(&self, saga: &SagaInstance) -> Result<(), SchedulerError>;
}

/// Trigger used when no orchestrator or choreography table is wired up; logs and
/// otherwise does nothing. Exists so a runtime can stand up the scheduler before the
/// rest of the saga machinery is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCompensationTrigger;

#[async_trait]
impl CompensationTrigger for NoOpCompensationTrigger {
    async fn trigger(&self, saga: &SagaInstance) -> Result<(), SchedulerError> {
        tracing::warn!(saga_id = %saga.saga_id, "timed-out saga has no compensation trigger configured");
        Ok(())
    }
}
