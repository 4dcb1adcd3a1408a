use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use resilience::RetryPolicy;
use serde_json::Value;

use crate::context::SagaContext;
use crate::error::StepError;

/// Performs work against the saga's context, typically an outbound call. Returns the
/// context delta to merge on success (§4.6).
#[async_trait]
pub trait ForwardAction: Send + Sync {
    async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError>;
}

/// Undoes a forward action's effect. Must be safe to call more than once: a crash
/// between `record_compensation_step` and the next step's compensation can replay it.
#[async_trait]
pub trait CompensationAction: Send + Sync {
    async fn compensate(&self, ctx: &SagaContext) -> Result<(), StepError>;
}

/// One step of a saga definition: forward action, its compensation, the event types
/// recorded to D, and the retry/timeout policy the forward action runs under.
pub struct SagaStep {
    pub name: String,
    pub service: String,
    pub event_type: String,
    pub compensating_event_type: String,
    pub forward: Arc<dyn ForwardAction>,
    pub compensation: Arc<dyn CompensationAction>,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl SagaStep {
    pub fn new(
        name: impl Into<String>,
        service: impl Into<String>,
        event_type: impl Into<String>,
        compensating_event_type: impl Into<String>,
        forward: Arc<dyn ForwardAction>,
        compensation: Arc<dyn CompensationAction>,
    ) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            event_type: event_type.into(),
            compensating_event_type: compensating_event_type.into(),
            forward,
            compensation,
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}
