//! Write-behind-backed [`ViewStore`] (§4.10: "the hot tier is the keyed in-memory
//! store used by (A) and (B)"). Delegates durability to `write_behind::WriteBehindStore`,
//! adding only what a view store needs on top of a plain single-key KV contract: a
//! per-`(view, key)` critical section for `atomic_update`'s compare-and-swap semantics,
//! and a per-view key index so `scan`/`clear` can enumerate without a range query.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use write_behind::WriteBehindStore;

use crate::error::ViewStoreError;
use crate::store::{UpdateOutcome, ViewStore};

fn compound_key(view: &str, key: &str) -> String {
    format!("{view}\u{1}{key}")
}

/// `write_behind::WriteBehindStore` stores one current value per key; a deleted view
/// record is represented as `Value::Null` rather than an actual removal, since the
/// batcher's contract has no delete operation (§4.10 only specifies "writes" and
/// "reads").
pub struct WriteBehindViewStore {
    store: Arc<WriteBehindStore<Value>>,
    locks: DashMap<(String, String), Arc<AsyncMutex<()>>>,
    view_keys: DashMap<String, DashSet<String>>,
}

impl WriteBehindViewStore {
    pub fn new(store: Arc<WriteBehindStore<Value>>) -> Self {
        Self { store, locks: DashMap::new(), view_keys: DashMap::new() }
    }

    fn lock_for(&self, view: &str, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry((view.to_string(), key.to_string()))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn track_key(&self, view: &str, key: &str) {
        self.view_keys.entry(view.to_string()).or_default().insert(key.to_string());
    }

    fn untrack_key(&self, view: &str, key: &str) {
        if let Some(keys) = self.view_keys.get(view) {
            keys.remove(key);
        }
    }

    async fn raw_get(&self, view: &str, key: &str) -> Result<Option<Value>, ViewStoreError> {
        self.store
            .get(&compound_key(view, key))
            .await
            .map(|found| found.filter(|v| !v.is_null()))
            .map_err(|err| ViewStoreError::Storage { view: view.to_string(), reason: err.to_string() })
    }
}

#[async_trait]
impl ViewStore for WriteBehindViewStore {
    async fn get(&self, view: &str, key: &str) -> Result<Option<Value>, ViewStoreError> {
        self.raw_get(view, key).await
    }

    async fn put(&self, view: &str, key: &str, record: Value) -> Result<(), ViewStoreError> {
        let _guard = self.lock_for(view, key).lock().await;
        self.store.put(&compound_key(view, key), record).await;
        self.track_key(view, key);
        Ok(())
    }

    async fn delete(&self, view: &str, key: &str) -> Result<(), ViewStoreError> {
        let _guard = self.lock_for(view, key).lock().await;
        self.store.put(&compound_key(view, key), Value::Null).await;
        self.untrack_key(view, key);
        Ok(())
    }

    async fn clear(&self, view: &str) -> Result<(), ViewStoreError> {
        if let Some((_, keys)) = self.view_keys.remove(view) {
            for key in keys.iter() {
                let _guard = self.lock_for(view, &key).lock().await;
                self.store.put(&compound_key(view, &key), Value::Null).await;
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
            if let Some(record) = self.raw_get(view, &key).await? {
                visitor(&key, &record);
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
        let lock = self.lock_for(view, key);
        let _guard = lock.lock().await;

        let current = self.raw_get(view, key).await?;
        let outcome = f(current.as_ref());
        match &outcome {
            UpdateOutcome::Put(value) => {
                self.store.put(&compound_key(view, key), value.clone()).await;
                self.track_key(view, key);
            }
            UpdateOutcome::Delete => {
                self.store.put(&compound_key(view, key), Value::Null).await;
                self.untrack_key(view, key);
            }
            UpdateOutcome::Unchanged => {}
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use write_behind::WriteBehindConfig;

    fn store() -> WriteBehindViewStore {
        let wb = Arc::new(WriteBehindStore::new(
            WriteBehindConfig::default(),
            Arc::new(write_behind::NoOpDurableTier::<Value>::new()),
            Arc::new(write_behind::NoOpDeadLetterSink),
        ));
        WriteBehindViewStore::new(wb)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = store();
        store.put("orders", "o1", json!({"status": "NEW"})).await.unwrap();
        assert_eq!(store.get("orders", "o1").await.unwrap(), Some(json!({"status": "NEW"})));
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let store = store();
        store.put("orders", "o1", json!({"status": "NEW"})).await.unwrap();
        store.delete("orders", "o1").await.unwrap();
        assert_eq!(store.get("orders", "o1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn atomic_update_observes_prior_value_and_commits() {
        let store = store();
        store.put("orders", "o1", json!({"count": 1})).await.unwrap();

        store
            .atomic_update(
                "orders",
                "o1",
                Box::new(|current| {
                    let count = current.and_then(|v| v.get("count")).and_then(|v| v.as_i64()).unwrap_or(0);
                    UpdateOutcome::Put(json!({"count": count + 1}))
                }),
            )
            .await
            .unwrap();

        assert_eq!(store.get("orders", "o1").await.unwrap(), Some(json!({"count": 2})));
    }

    #[tokio::test]
    async fn clear_empties_tracked_view_only() {
        let store = store();
        store.put("orders", "o1", json!({"a": 1})).await.unwrap();
        store.put("customers", "c1", json!({"a": 1})).await.unwrap();

        store.clear("orders").await.unwrap();

        assert_eq!(store.get("orders", "o1").await.unwrap(), None);
        assert_eq!(store.get("customers", "c1").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn scan_visits_every_live_key_in_the_view() {
        let store = store();
        store.put("orders", "o1", json!({"a": 1})).await.unwrap();
        store.put("orders", "o2", json!({"a": 2})).await.unwrap();
        store.delete("orders", "o2").await.unwrap();

        let mut seen = Vec::new();
        store.scan("orders", &mut |k, v| seen.push((k.to_string(), v.clone()))).await.unwrap();

        assert_eq!(seen, vec![("o1".to_string(), json!({"a": 1}))]);
    }
}
