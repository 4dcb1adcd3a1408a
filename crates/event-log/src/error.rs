use event_model::{Classify, FailureClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event {event_id} already stored in domain {domain}")]
    DuplicateEvent { domain: String, event_id: uuid::Uuid },

    #[error("event failed validation: {reason}")]
    Validation { reason: String },

    #[error("durable tier unavailable: {reason}")]
    Storage { reason: String },
}

impl Classify for EventLogError {
    fn classify(&self) -> FailureClass {
        match self {
            EventLogError::DuplicateEvent { .. } => FailureClass::Duplicate,
            EventLogError::Validation { .. } => FailureClass::NonRetryableBusiness,
            EventLogError::Storage { .. } => FailureClass::Storage,
        }
    }
}
