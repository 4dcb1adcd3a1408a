use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::durable::{DurableSagaRow, DurableTier, NoOpDurableTier};
use crate::error::SagaStoreError;
use crate::model::{SagaInstance, SagaStatus, StepRecord, StepStatus};

/// Durable tracking of saga instances (Component D, §4.5). Every mutation is taken
/// under a single coarse lock: sagas are not a hot path the way event append is, and
/// serializing every transition trivially gives the "compare-and-set on
/// `(saga_id, status)`, loser aborts" guarantee §5 asks for.
#[async_trait]
pub trait SagaStore: Send + Sync {
    async fn start(
        &self,
        saga_id: Uuid,
        saga_type: &str,
        correlation_id: Option<Uuid>,
        total_steps: u32,
        timeout: std::time::Duration,
    ) -> Result<SagaInstance, SagaStoreError>;

    async fn record_step_completed(
        &self,
        saga_id: Uuid,
        step_number: u32,
        event_type: &str,
        service: &str,
        event_id: Uuid,
    ) -> Result<SagaInstance, SagaStoreError>;

    async fn record_step_failed(
        &self,
        saga_id: Uuid,
        step_number: u32,
        event_type: &str,
        service: &str,
        reason: &str,
    ) -> Result<SagaInstance, SagaStoreError>;

    async fn record_compensation_step(
        &self,
        saga_id: Uuid,
        step_number: u32,
        event_type: &str,
        service: &str,
    ) -> Result<SagaInstance, SagaStoreError>;

    async fn complete(&self, saga_id: Uuid, terminal_status: SagaStatus) -> Result<SagaInstance, SagaStoreError>;

    async fn timed_out(&self, saga_id: Uuid) -> Result<SagaInstance, SagaStoreError>;

    /// Compare-and-set `{STARTED,IN_PROGRESS} -> COMPENSATING` with a `TIMEOUT`
    /// failure reason. Returns `true` if this call performed the transition (i.e. won
    /// the race against a concurrent orchestrator action), `false` if the saga was
    /// already past `STARTED`/`IN_PROGRESS` by the time this call took the lock.
    async fn try_begin_timeout_compensation(&self, saga_id: Uuid) -> Result<bool, SagaStoreError>;

    async fn get(&self, saga_id: Uuid) -> Option<SagaInstance>;
    async fn by_status(&self, status: SagaStatus) -> Vec<SagaInstance>;
    async fn by_correlation(&self, correlation_id: Uuid) -> Vec<SagaInstance>;
    async fn by_type(&self, saga_type: &str) -> Vec<SagaInstance>;

    /// Active (non-terminal) sagas whose deadline has passed `now`.
    async fn past_deadline(&self, now: DateTime<Utc>) -> Vec<SagaInstance>;

    async fn count_by_status(&self, status: SagaStatus) -> usize;
}

struct Indices {
    by_status: HashMap<SagaStatus, HashSet<Uuid>>,
    by_type: HashMap<String, HashSet<Uuid>>,
    by_correlation: HashMap<Uuid, HashSet<Uuid>>,
    by_deadline: BTreeMap<(DateTime<Utc>, Uuid), ()>,
}

impl Indices {
    fn new() -> Self {
        Self {
            by_status: HashMap::new(),
            by_type: HashMap::new(),
            by_correlation: HashMap::new(),
            by_deadline: BTreeMap::new(),
        }
    }

    fn insert(&mut self, saga: &SagaInstance) {
        self.by_status.entry(saga.status).or_default().insert(saga.saga_id);
        self.by_type.entry(saga.saga_type.clone()).or_default().insert(saga.saga_id);
        if let Some(correlation_id) = saga.correlation_id {
            self.by_correlation.entry(correlation_id).or_default().insert(saga.saga_id);
        }
        self.by_deadline.insert((saga.deadline, saga.saga_id), ());
    }

    fn remove_from_status(&mut self, status: SagaStatus, saga_id: Uuid) {
        if let Some(set) = self.by_status.get_mut(&status) {
            set.remove(&saga_id);
        }
    }
}

struct Inner {
    sagas: HashMap<Uuid, SagaInstance>,
    indices: Indices,
}

pub struct InMemorySagaStore {
    inner: RwLock<Inner>,
    durable: Arc<dyn DurableTier>,
}

impl InMemorySagaStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner { sagas: HashMap::new(), indices: Indices::new() }),
            durable: Arc::new(NoOpDurableTier),
        }
    }

    pub fn with_durable_tier(durable: Arc<dyn DurableTier>) -> Self {
        Self {
            inner: RwLock::new(Inner { sagas: HashMap::new(), indices: Indices::new() }),
            durable,
        }
    }

    async fn persist(&self, saga: &SagaInstance) {
        if let Err(err) = self.durable.upsert(DurableSagaRow::from_instance(saga)).await {
            warn!(saga_id = %saga.saga_id, error = %err, "saga durable upsert failed");
        }
    }

    fn transition(&self, inner: &mut Inner, saga_id: Uuid, next: SagaStatus) -> Result<(), SagaStoreError> {
        let saga = inner.sagas.get(&saga_id).ok_or(SagaStoreError::NotFound { saga_id })?;
        if !saga.status.can_transition_to(next) {
            return Err(SagaStoreError::InvalidTransition {
                saga_id,
                from: format!("{:?}", saga.status),
                to: format!("{next:?}"),
            });
        }
        let prev = saga.status;
        inner.indices.remove_from_status(prev, saga_id);
        let saga = inner.sagas.get_mut(&saga_id).unwrap();
        saga.status = next;
        inner.indices.by_status.entry(next).or_default().insert(saga_id);
        Ok(())
    }
}

impl Default for InMemorySagaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn start(
        &self,
        saga_id: Uuid,
        saga_type: &str,
        correlation_id: Option<Uuid>,
        total_steps: u32,
        timeout: std::time::Duration,
    ) -> Result<SagaInstance, SagaStoreError> {
        let now = Utc::now();
        let saga = SagaInstance {
            saga_id,
            saga_type: saga_type.to_string(),
            status: SagaStatus::Started,
            total_steps,
            current_step: 0,
            steps: Vec::new(),
            correlation_id,
            started_at: now,
            deadline: now + ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::seconds(60)),
            completed_at: None,
            failure_reason: None,
            failed_at_step: None,
        };

        {
            let mut inner = self.inner.write();
            if inner.sagas.contains_key(&saga_id) {
                return Err(SagaStoreError::AlreadyExists { saga_id });
            }
            inner.indices.insert(&saga);
            inner.sagas.insert(saga_id, saga.clone());
        }
        debug!(%saga_id, saga_type, total_steps, "saga started");
        self.persist(&saga).await;
        Ok(saga)
    }

    async fn record_step_completed(
        &self,
        saga_id: Uuid,
        step_number: u32,
        event_type: &str,
        service: &str,
        event_id: Uuid,
    ) -> Result<SagaInstance, SagaStoreError> {
        let saga = {
            let mut inner = self.inner.write();
            if inner.sagas.get(&saga_id).map(|s| s.status.is_terminal()).unwrap_or(false) {
                let status = inner.sagas[&saga_id].status;
                return Err(SagaStoreError::AlreadyTerminal { saga_id, status: format!("{status:?}") });
            }
            if inner.sagas.get(&saga_id).map(|s| s.status == SagaStatus::Started).unwrap_or(false) {
                self.transition(&mut inner, saga_id, SagaStatus::InProgress)?;
            }

            let saga = inner.sagas.get_mut(&saga_id).ok_or(SagaStoreError::NotFound { saga_id })?;
            saga.steps.push(StepRecord {
                step_number,
                step_name: event_type.to_string(),
                service: service.to_string(),
                event_type: event_type.to_string(),
                status: StepStatus::Completed,
                event_id: Some(event_id),
                failure_reason: None,
                timestamp: Utc::now(),
            });
            saga.current_step = step_number + 1;

            if saga.all_steps_completed() {
                saga.completed_at = Some(Utc::now());
                let saga_id = saga.saga_id;
                self.transition(&mut inner, saga_id, SagaStatus::Completed)?;
            }
            inner.sagas[&saga_id].clone()
        };
        debug!(%saga_id, step_number, status = ?saga.status, "step completed");
        self.persist(&saga).await;
        Ok(saga)
    }

    async fn record_step_failed(
        &self,
        saga_id: Uuid,
        step_number: u32,
        event_type: &str,
        service: &str,
        reason: &str,
    ) -> Result<SagaInstance, SagaStoreError> {
        let saga = {
            let mut inner = self.inner.write();
            {
                let saga = inner.sagas.get_mut(&saga_id).ok_or(SagaStoreError::NotFound { saga_id })?;
                saga.steps.push(StepRecord {
                    step_number,
                    step_name: event_type.to_string(),
                    service: service.to_string(),
                    event_type: event_type.to_string(),
                    status: StepStatus::Failed,
                    event_id: None,
                    failure_reason: Some(reason.to_string()),
                    timestamp: Utc::now(),
                });
                saga.failure_reason = Some(reason.to_string());
                saga.failed_at_step = Some(step_number);
            }
            self.transition(&mut inner, saga_id, SagaStatus::Compensating)?;
            inner.sagas[&saga_id].clone()
        };
        warn!(%saga_id, step_number, reason, "step failed, saga compensating");
        self.persist(&saga).await;
        Ok(saga)
    }

    async fn record_compensation_step(
        &self,
        saga_id: Uuid,
        step_number: u32,
        event_type: &str,
        service: &str,
    ) -> Result<SagaInstance, SagaStoreError> {
        let saga = {
            let mut inner = self.inner.write();
            {
                let saga = inner.sagas.get_mut(&saga_id).ok_or(SagaStoreError::NotFound { saga_id })?;
                let step = saga
                    .steps
                    .iter_mut()
                    .find(|s| s.step_number == step_number)
                    .ok_or(SagaStoreError::StepNotFound { saga_id, step_number })?;
                step.status = StepStatus::Compensated;
                step.timestamp = Utc::now();
                let _ = (event_type, service);
            }
            let done = inner.sagas[&saga_id].no_uncompensated_completed_steps();
            if done {
                self.transition(&mut inner, saga_id, SagaStatus::Compensated)?;
            }
            inner.sagas[&saga_id].clone()
        };
        debug!(%saga_id, step_number, status = ?saga.status, "compensation step recorded");
        self.persist(&saga).await;
        Ok(saga)
    }

    async fn complete(&self, saga_id: Uuid, terminal_status: SagaStatus) -> Result<SagaInstance, SagaStoreError> {
        if !terminal_status.is_terminal() {
            return Err(SagaStoreError::InvalidTransition {
                saga_id,
                from: "*".to_string(),
                to: format!("{terminal_status:?}"),
            });
        }
        let saga = {
            let mut inner = self.inner.write();
            self.transition(&mut inner, saga_id, terminal_status)?;
            let saga = inner.sagas.get_mut(&saga_id).unwrap();
            saga.completed_at.get_or_insert_with(Utc::now);
            saga.clone()
        };
        self.persist(&saga).await;
        Ok(saga)
    }

    async fn timed_out(&self, saga_id: Uuid) -> Result<SagaInstance, SagaStoreError> {
        self.complete(saga_id, SagaStatus::TimedOut).await
    }

    async fn try_begin_timeout_compensation(&self, saga_id: Uuid) -> Result<bool, SagaStoreError> {
        let mut inner = self.inner.write();
        let eligible = inner
            .sagas
            .get(&saga_id)
            .map(|s| matches!(s.status, SagaStatus::Started | SagaStatus::InProgress))
            .unwrap_or(false);
        if !eligible {
            return Ok(false);
        }
        self.transition(&mut inner, saga_id, SagaStatus::Compensating)?;
        let saga = inner.sagas.get_mut(&saga_id).unwrap();
        saga.failure_reason = Some("TIMEOUT".to_string());
        Ok(true)
    }

    async fn get(&self, saga_id: Uuid) -> Option<SagaInstance> {
        self.inner.read().sagas.get(&saga_id).cloned()
    }

    async fn by_status(&self, status: SagaStatus) -> Vec<SagaInstance> {
        let inner = self.inner.read();
        inner
            .indices
            .by_status
            .get(&status)
            .map(|ids| ids.iter().filter_map(|id| inner.sagas.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    async fn by_correlation(&self, correlation_id: Uuid) -> Vec<SagaInstance> {
        let inner = self.inner.read();
        inner
            .indices
            .by_correlation
            .get(&correlation_id)
            .map(|ids| ids.iter().filter_map(|id| inner.sagas.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    async fn by_type(&self, saga_type: &str) -> Vec<SagaInstance> {
        let inner = self.inner.read();
        inner
            .indices
            .by_type
            .get(saga_type)
            .map(|ids| ids.iter().filter_map(|id| inner.sagas.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    async fn past_deadline(&self, now: DateTime<Utc>) -> Vec<SagaInstance> {
        let inner = self.inner.read();
        inner
            .indices
            .by_deadline
            .range(..(now, Uuid::max()))
            .filter_map(|((_, id), ())| inner.sagas.get(id))
            .filter(|s| matches!(s.status, SagaStatus::Started | SagaStatus::InProgress))
            .cloned()
            .collect()
    }

    async fn count_by_status(&self, status: SagaStatus) -> usize {
        self.inner.read().indices.by_status.get(&status).map(HashSet::len).unwrap_or(0)
    }
}
