use event_model::{Classify, FailureClass};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("saga store error during timeout sweep: {0}")]
    Store(#[from] saga_store::SagaStoreError),

    #[error("compensation trigger failed for saga {saga_id}: {reason}")]
    TriggerFailed { saga_id: Uuid, reason: String },
}

impl Classify for SchedulerError {
    fn classify(&self) -> FailureClass {
        match self {
            SchedulerError::Store(err) => err.classify(),
            SchedulerError::TriggerFailed { .. } => FailureClass::Transient,
        }
    }
}
