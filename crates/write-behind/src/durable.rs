use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::WriteBehindError;

/// Durable tier written by the coalescing batcher, one row per `(domain, key,
/// sequence?)` for events or `(view_name, key)` for views (§4.10). Generic over the
/// value type so this crate can back either the event log or the view store.
#[async_trait]
pub trait DurableTier<V>: Send + Sync {
    async fn upsert_batch(&self, partition: usize, entries: Vec<(String, V)>) -> Result<(), WriteBehindError>;
    async fn get(&self, key: &str) -> Result<Option<V>, WriteBehindError>;
}

/// Used when no durable tier is configured; writes succeed without landing anywhere,
/// reads always miss. Recovery in that configuration is by event replay only.
pub struct NoOpDurableTier<V>(PhantomData<V>);

impl<V> NoOpDurableTier<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for NoOpDurableTier<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Send + Sync> DurableTier<V> for NoOpDurableTier<V> {
    async fn upsert_batch(&self, _partition: usize, _entries: Vec<(String, V)>) -> Result<(), WriteBehindError> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<V>, WriteBehindError> {
        Ok(None)
    }
}
