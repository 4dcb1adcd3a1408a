use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use event_model::envelope::{EventEnvelope, SagaMeta};
use pipeline_engine::EventBus;
use saga_store::SagaInstance;
use timeout_scheduler::{CompensationTrigger, SchedulerError};
use tracing::{error, warn};

use crate::definition::SagaDefinition;
use crate::executor::SagaOrchestrator;

/// One saga type's `forward_type -> compensating_type` mapping (§4.6 choreographed
/// variant): there is no central executor, so a timed-out choreographed saga is
/// compensated by publishing each already-completed step's compensating event and
/// letting the owning service run its own undo.
#[derive(Debug, Default, Clone)]
pub struct ChoreographyTable {
    by_saga_type: HashMap<String, HashMap<String, String>>,
}

impl ChoreographyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, saga_type: impl Into<String>, forward_type: impl Into<String>, compensating_type: impl Into<String>) -> Self {
        self.by_saga_type.entry(saga_type.into()).or_default().insert(forward_type.into(), compensating_type.into());
        self
    }

    pub fn compensating_type_for(&self, saga_type: &str, forward_type: &str) -> Option<&str> {
        self.by_saga_type.get(saga_type)?.get(forward_type).map(String::as_str)
    }
}

/// Fires timeout compensation for a choreographed saga by publishing the
/// compensating event type of each completed step, in reverse order, onto the bus's
/// `{saga_type}_SAGA` topic. Participants are expected to treat the compensating
/// event the same way as any other saga-bearing event they subscribe to.
pub struct ChoreographedCompensationTrigger {
    table: ChoreographyTable,
    bus: Arc<dyn EventBus>,
}

impl ChoreographedCompensationTrigger {
    pub fn new(table: ChoreographyTable, bus: Arc<dyn EventBus>) -> Self {
        Self { table, bus }
    }
}

#[async_trait]
impl CompensationTrigger for ChoreographedCompensationTrigger {
    async fn trigger(&self, saga: &SagaInstance) -> Result<(), SchedulerError> {
        let topic = format!("{}_SAGA", saga.saga_type);
        for step in saga.steps.iter().filter(|s| s.status == saga_store::StepStatus::Completed).rev() {
            let Some(compensating_type) = self.table.compensating_type_for(&saga.saga_type, &step.event_type) else {
                warn!(saga_id = %saga.saga_id, event_type = %step.event_type, "no choreography entry for forward event type, skipping");
                continue;
            };
            let event = EventEnvelope::builder(compensating_type, saga.saga_id.to_string())
                .correlation_id(saga.correlation_id.unwrap_or(saga.saga_id))
                .saga_meta(SagaMeta {
                    saga_id: saga.saga_id,
                    saga_type: saga.saga_type.clone(),
                    step_number: step.step_number,
                    is_compensating: true,
                })
                .payload(serde_json::json!({ "reason": "TIMEOUT" }))
                .build();

            self.bus.publish(&topic, &event).await.map_err(|err| SchedulerError::TriggerFailed {
                saga_id: saga.saga_id,
                reason: err.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Fires timeout compensation for an orchestrated saga by running the
/// orchestrator's own reverse-order compensation protocol in-process (§4.6 step 3,
/// reused by §4.7 step 3). Context is reconstructed empty: the original in-memory
/// `SagaContext` built during forward execution does not survive a process
/// boundary, so compensation actions triggered by timeout must be able to resolve
/// whatever state they need from `saga_id`/`correlation_id` alone.
pub struct OrchestratedCompensationTrigger {
    orchestrator: Arc<SagaOrchestrator>,
    definitions: HashMap<String, Arc<SagaDefinition>>,
}

impl OrchestratedCompensationTrigger {
    pub fn new(orchestrator: Arc<SagaOrchestrator>, definitions: HashMap<String, Arc<SagaDefinition>>) -> Self {
        Self { orchestrator, definitions }
    }
}

#[async_trait]
impl CompensationTrigger for OrchestratedCompensationTrigger {
    async fn trigger(&self, saga: &SagaInstance) -> Result<(), SchedulerError> {
        let Some(definition) = self.definitions.get(&saga.saga_type) else {
            warn!(saga_id = %saga.saga_id, saga_type = %saga.saga_type, "no saga definition registered for timeout compensation");
            return Ok(());
        };

        let completed: Vec<usize> = saga
            .steps
            .iter()
            .filter(|s| s.status == saga_store::StepStatus::Completed)
            .map(|s| s.step_number as usize)
            .collect();

        let ctx = crate::context::SagaContext::new(serde_json::json!({}));
        if let Err(err) = self.orchestrator.compensate_timed_out(saga.saga_id, definition, &ctx, &completed).await {
            error!(saga_id = %saga.saga_id, error = %err, "timeout-triggered compensation failed");
            return Err(SchedulerError::TriggerFailed { saga_id: saga.saga_id, reason: err.to_string() });
        }
        Ok(())
    }
}
