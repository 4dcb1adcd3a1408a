use event_model::{Classify, FailureClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteBehindError {
    #[error("durable tier error: {reason}")]
    Storage { reason: String },

    #[error("key {key} exhausted flush retries and was routed to dead-letter: {reason}")]
    Poisoned { key: String, reason: String },
}

impl Classify for WriteBehindError {
    fn classify(&self) -> FailureClass {
        match self {
            WriteBehindError::Storage { .. } => FailureClass::Storage,
            WriteBehindError::Poisoned { .. } => FailureClass::NonRetryableBusiness,
        }
    }
}
