use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ViewStoreError;

type RecordKey = (String, String);

/// What an `atomic_update` closure decided to do with the current record.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Put(Value),
    Delete,
    Unchanged,
}

/// Materialized view storage (§4.2/§4.4). Implementations must give `atomic_update`
/// per-key exclusivity and make `scan` snapshot-consistent within a single view.
#[async_trait]
pub trait ViewStore: Send + Sync {
    async fn get(&self, view: &str, key: &str) -> Result<Option<Value>, ViewStoreError>;
    async fn put(&self, view: &str, key: &str, record: Value) -> Result<(), ViewStoreError>;
    async fn delete(&self, view: &str, key: &str) -> Result<(), ViewStoreError>;
    async fn clear(&self, view: &str) -> Result<(), ViewStoreError>;
    async fn scan(&self, view: &str, visitor: &mut (dyn FnMut(&str, &Value) + Send)) -> Result<(), ViewStoreError>;

    /// Applies `f` to the current record (or `None` if absent) and commits whatever it
    /// returns, all while holding the per-key lock. `f` must be a pure function of its
    /// input (§4.4) — no I/O, no awaiting other resources.
    async fn atomic_update(
        &self,
        view: &str,
        key: &str,
        f: Box<dyn FnOnce(Option<&Value>) -> UpdateOutcome + Send>,
    ) -> Result<UpdateOutcome, ViewStoreError>;
}

/// Dashmap-per-view in-memory implementation. Each `(view, key)` pair owns its own
/// `parking_lot::Mutex`, so `atomic_update` on disjoint keys never contends.
#[derive(Default)]
pub struct InMemoryViewStore {
    records: DashMap<RecordKey, Arc<Mutex<Option<Value>>>>,
    view_keys: DashMap<String, DashSet<String>>,
}

impl InMemoryViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, view: &str, key: &str) -> Arc<Mutex<Option<Value>>> {
        self.records
            .entry((view.to_string(), key.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn track_key(&self, view: &str, key: &str) {
        self.view_keys
            .entry(view.to_string())
            .or_default()
            .insert(key.to_string());
    }

    fn untrack_key(&self, view: &str, key: &str) {
        if let Some(keys) = self.view_keys.get(view) {
            keys.remove(key);
        }
    }
}

#[async_trait]
impl ViewStore for InMemoryViewStore {
    async fn get(&self, view: &str, key: &str) -> Result<Option<Value>, ViewStoreError> {
        Ok(self.slot(view, key).lock().clone())
    }

    async fn put(&self, view: &str, key: &str, record: Value) -> Result<(), ViewStoreError> {
        *self.slot(view, key).lock() = Some(record);
        self.track_key(view, key);
        Ok(())
    }

    async fn delete(&self, view: &str, key: &str) -> Result<(), ViewStoreError> {
        *self.slot(view, key).lock() = None;
        self.untrack_key(view, key);
        Ok(())
    }

    async fn clear(&self, view: &str) -> Result<(), ViewStoreError> {
        if let Some((_, keys)) = self.view_keys.remove(view) {
            for key in keys.iter() {
                self.records.remove(&(view.to_string(), key.clone()));
            }
        }
        Ok(())
    }

    async fn scan(&self, view: &str, visitor: &mut (dyn FnMut(&str, &Value) + Send)) -> Result<(), ViewStoreError> {
        let keys: Vec<String> = self
            .view_keys
            .get(view)
            .map(|set| set.iter().map(|k| k.clone()).collect())
            .unwrap_or_default();

        for key in keys {
            let guard = self.slot(view, &key).lock();
            if let Some(record) = guard.as_ref() {
                visitor(&key, record);
            }
        }
        Ok(())
    }

    async fn atomic_update(
        &self,
        view: &str,
        key: &str,
        f: Box<dyn FnOnce(Option<&Value>) -> UpdateOutcome + Send>,
    ) -> Result<UpdateOutcome, ViewStoreError> {
        let slot = self.slot(view, key);
        let mut guard = slot.lock();
        let outcome = f(guard.as_ref());
        match &outcome {
            UpdateOutcome::Put(value) => {
                *guard = Some(value.clone());
                drop(guard);
                self.track_key(view, key);
            }
            UpdateOutcome::Delete => {
                *guard = None;
                drop(guard);
                self.untrack_key(view, key);
            }
            UpdateOutcome::Unchanged => {}
        }
        Ok(outcome)
    }
}
