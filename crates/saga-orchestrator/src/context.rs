use dashmap::DashMap;
use serde_json::Value;

/// Key-value bag carried across a saga's steps (§4.6). Thread-safe and readable by
/// every subsequent step; a successful forward action's delta is merged in before the
/// next step runs.
#[derive(Debug, Default)]
pub struct SagaContext {
    values: DashMap<String, Value>,
}

impl SagaContext {
    pub fn new(initial: Value) -> Self {
        let values = DashMap::new();
        if let Value::Object(map) = initial {
            for (k, v) in map {
                values.insert(k, v);
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merges a step's returned delta object into the context, overwriting on key
    /// collision. Non-object deltas are ignored: a step with nothing to report
    /// returns `Value::Null`.
    pub fn merge_delta(&self, delta: Value) {
        if let Value::Object(map) = delta {
            for (k, v) in map {
                self.values.insert(k, v);
            }
        }
    }

    pub fn snapshot(&self) -> Value {
        let map: serde_json::Map<String, Value> =
            self.values.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_delta_overwrites_existing_keys() {
        let ctx = SagaContext::new(serde_json::json!({"order_id": "o1"}));
        ctx.merge_delta(serde_json::json!({"order_id": "o1", "reserved_sku": "sku-1"}));

        assert_eq!(ctx.get("reserved_sku"), Some(serde_json::json!("sku-1")));
        assert_eq!(ctx.get("order_id"), Some(serde_json::json!("o1")));
    }

    #[test]
    fn non_object_delta_is_ignored() {
        let ctx = SagaContext::new(serde_json::json!({"order_id": "o1"}));
        ctx.merge_delta(Value::Null);

        assert_eq!(ctx.get("order_id"), Some(serde_json::json!("o1")));
    }
}
