use event_model::{Classify, FailureClass};
use thiserror::Error;
use uuid::Uuid;

/// Failure from a forward action or its compensation (§4.6). `retryable = false`
/// marks the business-validation / explicit-decline exceptions the spec says must
/// skip further retries.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{reason}")]
    Failed { reason: String, retryable: bool },

    #[error("step timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl StepError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        StepError::Failed { reason: reason.into(), retryable: true }
    }

    pub fn non_retryable(reason: impl Into<String>) -> Self {
        StepError::Failed { reason: reason.into(), retryable: false }
    }
}

impl Classify for StepError {
    fn classify(&self) -> FailureClass {
        match self {
            StepError::Failed { retryable: true, .. } => FailureClass::Transient,
            StepError::Failed { retryable: false, .. } => FailureClass::NonRetryableBusiness,
            StepError::Timeout(_) => FailureClass::Transient,
        }
    }
}

#[derive(Debug, Error)]
pub enum SagaOrchestratorError {
    #[error(transparent)]
    Store(#[from] saga_store::SagaStoreError),

    #[error("saga {saga_id} failed at step {step}: {reason}")]
    StepFailed { saga_id: Uuid, step: String, reason: String },

    #[error("saga {saga_id} failed to compensate step {step}, operator intervention required: {reason}")]
    CompensationFailed { saga_id: Uuid, step: String, reason: String },
}

impl Classify for SagaOrchestratorError {
    fn classify(&self) -> FailureClass {
        match self {
            SagaOrchestratorError::Store(err) => err.classify(),
            SagaOrchestratorError::StepFailed { .. } => FailureClass::NonRetryableBusiness,
            SagaOrchestratorError::CompensationFailed { .. } => FailureClass::Consistency,
        }
    }
}
