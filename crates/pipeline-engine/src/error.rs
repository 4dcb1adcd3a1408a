use event_model::{Classify, FailureClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ingress is full, try again later")]
    Backpressure,

    #[error("event failed validation: {reason}")]
    Validation { reason: String },

    #[error("unknown event_type {event_type}, rejected at ingress")]
    UnknownEventType { event_type: String },

    #[error("stage failure: {reason}")]
    Storage { reason: String },

    #[error("event diverted to dead-letter after retries exhausted: {reason}")]
    Poisoned { reason: String },
}

impl Classify for PipelineError {
    fn classify(&self) -> FailureClass {
        match self {
            PipelineError::Backpressure => FailureClass::Transient,
            PipelineError::Validation { .. } => FailureClass::NonRetryableBusiness,
            PipelineError::UnknownEventType { .. } => FailureClass::NonRetryableBusiness,
            PipelineError::Storage { .. } => FailureClass::Storage,
            PipelineError::Poisoned { .. } => FailureClass::NonRetryableBusiness,
        }
    }
}

impl From<event_log::EventLogError> for PipelineError {
    fn from(err: event_log::EventLogError) -> Self {
        match err {
            event_log::EventLogError::DuplicateEvent { .. } => {
                // Treated as an idempotent no-op by PERSIST, never surfaced as a pipeline
                // failure; callers that need this branch match on EventLogError directly.
                PipelineError::Storage { reason: err.to_string() }
            }
            event_log::EventLogError::Validation { reason } => PipelineError::Validation { reason },
            event_log::EventLogError::Storage { reason } => PipelineError::Storage { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_and_storage_are_retryable() {
        assert_eq!(PipelineError::Backpressure.classify(), FailureClass::Transient);
        assert_eq!(PipelineError::Storage { reason: "down".into() }.classify(), FailureClass::Storage);
    }

    #[test]
    fn validation_and_unknown_type_are_non_retryable() {
        assert_eq!(
            PipelineError::Validation { reason: "bad".into() }.classify(),
            FailureClass::NonRetryableBusiness
        );
        assert_eq!(
            PipelineError::UnknownEventType { event_type: "Mystery".into() }.classify(),
            FailureClass::NonRetryableBusiness
        );
    }
}
