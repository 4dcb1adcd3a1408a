//! Shared failure classification (§7 error handling taxonomy).
//!
//! Individual crates define their own `thiserror` error enums; this module gives them a
//! common vocabulary for retry/compensation decisions so the resilience layer, the
//! pipeline, and the saga orchestrator agree on what "retryable" means.

/// Whether a failure should be retried by the resilient invoker, or propagated
/// immediately (e.g. to trigger saga compensation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network blips, remote 5xx, timeouts: retry with backoff.
    Transient,
    /// Payment declined, policy violation, malformed business state: never retried.
    NonRetryableBusiness,
    /// Same `event_id` observed twice: treated as a no-op, not a failure at all.
    Duplicate,
    /// Durable tier unavailable.
    Storage,
    /// An invariant was violated (e.g. saga status lattice).
    Consistency,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureClass::Transient | FailureClass::Storage)
    }
}

/// Trait implemented by each crate's error enum so cross-cutting code (retry,
/// circuit breaker, dead-letter routing) can classify failures without matching on
/// concrete error types.
pub trait Classify {
    fn classify(&self) -> FailureClass;
}
