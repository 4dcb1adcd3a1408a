use event_model::{Classify, FailureClass};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SagaStoreError {
    #[error("saga {saga_id} not found")]
    NotFound { saga_id: Uuid },

    #[error("saga {saga_id} already exists")]
    AlreadyExists { saga_id: Uuid },

    #[error("invalid transition for saga {saga_id}: {from:?} -> {to:?}")]
    InvalidTransition { saga_id: Uuid, from: String, to: String },

    #[error("saga {saga_id} is already terminal ({status:?})")]
    AlreadyTerminal { saga_id: Uuid, status: String },

    #[error("step {step_number} not found on saga {saga_id}")]
    StepNotFound { saga_id: Uuid, step_number: u32 },

    #[error("durable tier unavailable: {reason}")]
    Storage { reason: String },
}

impl Classify for SagaStoreError {
    fn classify(&self) -> FailureClass {
        match self {
            SagaStoreError::NotFound { .. } => FailureClass::NonRetryableBusiness,
            SagaStoreError::AlreadyExists { .. } => FailureClass::Duplicate,
            SagaStoreError::InvalidTransition { .. } => FailureClass::Consistency,
            SagaStoreError::AlreadyTerminal { .. } => FailureClass::Consistency,
            SagaStoreError::StepNotFound { .. } => FailureClass::NonRetryableBusiness,
            SagaStoreError::Storage { .. } => FailureClass::Storage,
        }
    }
}
