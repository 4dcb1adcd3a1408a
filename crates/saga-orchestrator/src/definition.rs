use crate::step::SagaStep;

/// An ordered list of steps identified by `saga_type` (§4.6). The same definition is
/// used whether execution is orchestrated in-process or driven choreographically; the
/// choreographed variant only consults `saga_type` and each step's event types.
pub struct SagaDefinition {
    pub saga_type: String,
    pub steps: Vec<SagaStep>,
    pub total_timeout: std::time::Duration,
}

impl SagaDefinition {
    pub fn new(saga_type: impl Into<String>, steps: Vec<SagaStep>) -> Self {
        Self { saga_type: saga_type.into(), steps, total_timeout: std::time::Duration::from_secs(300) }
    }

    pub fn with_total_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.total_timeout = timeout;
        self
    }
}
