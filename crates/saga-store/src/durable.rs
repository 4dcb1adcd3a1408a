//! Durable tier for saga state, matching the `saga_state` table of §6.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SagaStoreError;
use crate::model::SagaInstance;

#[derive(Debug, Clone)]
pub struct DurableSagaRow {
    pub saga_id: Uuid,
    pub saga_type: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub deadline: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<Uuid>,
}

impl DurableSagaRow {
    pub fn from_instance(saga: &SagaInstance) -> Self {
        Self {
            saga_id: saga.saga_id,
            saga_type: saga.saga_type.clone(),
            status: format!("{:?}", saga.status),
            payload: serde_json::to_value(saga).unwrap_or_default(),
            deadline: saga.deadline,
            correlation_id: saga.correlation_id,
        }
    }
}

#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn upsert(&self, row: DurableSagaRow) -> Result<(), SagaStoreError>;
    async fn load_all(&self) -> Result<Vec<DurableSagaRow>, SagaStoreError>;
}

/// No-op durable tier used when the runtime's capability struct has no durable saga
/// persistence configured; saga state then lives only in the hot in-memory index.
#[derive(Debug, Default, Clone)]
pub struct NoOpDurableTier;

#[async_trait]
impl DurableTier for NoOpDurableTier {
    async fn upsert(&self, _row: DurableSagaRow) -> Result<(), SagaStoreError> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<DurableSagaRow>, SagaStoreError> {
        Ok(Vec::new())
    }
}
