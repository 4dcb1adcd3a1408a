use event_model::{Classify, FailureClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewStoreError {
    #[error("view {view} is not registered")]
    UnknownView { view: String },

    #[error("atomic_update aborted: {reason}")]
    UpdateAborted { reason: String },

    #[error("storage failure in view {view}: {reason}")]
    Storage { view: String, reason: String },
}

impl Classify for ViewStoreError {
    fn classify(&self) -> FailureClass {
        match self {
            ViewStoreError::UnknownView { .. } => FailureClass::NonRetryableBusiness,
            ViewStoreError::UpdateAborted { .. } => FailureClass::Consistency,
            ViewStoreError::Storage { .. } => FailureClass::Storage,
        }
    }
}
