use event_model::{Classify, FailureClass};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox entry {id} not found")]
    NotFound { id: Uuid },

    #[error("dead-letter entry {id} not found")]
    DeadLetterNotFound { id: Uuid },

    #[error("dead-letter entry {id} is not replayable")]
    NotReplayable { id: Uuid },

    #[error("publish to {destination} failed: {reason}")]
    PublishFailed { destination: String, reason: String },
}

impl Classify for OutboxError {
    fn classify(&self) -> FailureClass {
        match self {
            OutboxError::NotFound { .. } => FailureClass::NonRetryableBusiness,
            OutboxError::DeadLetterNotFound { .. } => FailureClass::NonRetryableBusiness,
            OutboxError::NotReplayable { .. } => FailureClass::NonRetryableBusiness,
            OutboxError::PublishFailed { .. } => FailureClass::Transient,
        }
    }
}
