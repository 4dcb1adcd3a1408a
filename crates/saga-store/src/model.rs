//! Saga instance and step record shapes (§3.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The saga status lattice (§4.5): `STARTED -> IN_PROGRESS -> {COMPLETED |
/// COMPENSATING -> {COMPENSATED | FAILED}} | TIMED_OUT`. Terminal statuses are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStatus {
    Started,
    InProgress,
    Compensating,
    Completed,
    Compensated,
    Failed,
    TimedOut,
}

impl SagaStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed | SagaStatus::TimedOut
        )
    }

    /// Whether `self -> next` is an edge in the status lattice.
    pub fn can_transition_to(self, next: SagaStatus) -> bool {
        use SagaStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Started, InProgress)
                | (Started, Compensating)
                | (Started, TimedOut)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Compensating)
                | (InProgress, TimedOut)
                | (Compensating, Compensated)
                | (Compensating, Failed)
                | (Compensating, TimedOut)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
    Compensated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u32,
    pub step_name: String,
    pub service: String,
    pub event_type: String,
    pub status: StepStatus,
    pub event_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    pub saga_id: Uuid,
    pub saga_type: String,
    pub status: SagaStatus,
    pub total_steps: u32,
    pub current_step: u32,
    pub steps: Vec<StepRecord>,
    pub correlation_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub failed_at_step: Option<u32>,
}

impl SagaInstance {
    /// §3.4 invariant: `COMPLETED` iff every step is `COMPLETED` and `current_step ==
    /// total_steps`.
    pub fn all_steps_completed(&self) -> bool {
        self.current_step == self.total_steps
            && self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// §3.4 invariant: every step that reached `COMPLETED` now has a matching
    /// `COMPENSATED` record — the "compensation completeness" property (§8).
    pub fn no_uncompensated_completed_steps(&self) -> bool {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
            == 0
    }
}
