use event_model::{Classify, FailureClass};
use thiserror::Error;

/// Outcome of [`crate::ResilientInvoker::invoke`] when the call did not return a
/// value (§4.8: "fails with `CIRCUIT_OPEN`, the underlying error, or
/// `RETRIES_EXHAUSTED`").
#[derive(Debug, Error)]
pub enum InvokeError<E> {
    #[error("circuit open for resource {resource}")]
    CircuitOpen { resource: String },

    #[error("non-retryable failure calling {resource}: {source}")]
    NonRetryable { resource: String, #[source] source: E },

    #[error("retries exhausted calling {resource} after {attempts} attempts: {source}")]
    RetriesExhausted { resource: String, attempts: u32, #[source] source: E },
}

/// `CIRCUIT_OPEN` fails fast rather than burning retry budget; the wrapped error's
/// own classification otherwise passes through unchanged.
impl<E: Classify> Classify for InvokeError<E> {
    fn classify(&self) -> FailureClass {
        match self {
            InvokeError::CircuitOpen { .. } => FailureClass::NonRetryableBusiness,
            InvokeError::NonRetryable { source, .. } => source.classify(),
            InvokeError::RetriesExhausted { source, .. } => source.classify(),
        }
    }
}
