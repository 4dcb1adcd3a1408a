use async_trait::async_trait;
use event_model::EventEnvelope;
use tokio::sync::Mutex;

use crate::error::PipelineError;

/// Target for PUBLISH (§4.3 stage 5). `{domain}_EVENTS` for accepted events,
/// `{domain}_DLQ` for dead-lettered ones, `{domain}_SAGA` for saga notifications.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> Result<(), PipelineError>;
}

/// In-process bus used by tests and by runtimes that have not wired a real broker.
/// Keeps the last `capacity` published messages per topic for inspection.
pub struct InMemoryEventBus {
    published: Mutex<Vec<(String, EventEnvelope)>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self { published: Mutex::new(Vec::new()) }
    }

    pub async fn messages(&self, topic: &str) -> Vec<EventEnvelope> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> Result<(), PipelineError> {
        self.published.lock().await.push((topic.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(key: &str) -> EventEnvelope {
        EventEnvelope::builder("OrderCreated", key).payload(serde_json::json!({})).build()
    }

    #[tokio::test]
    async fn messages_are_scoped_to_their_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish("Order_EVENTS", &event("o1")).await.unwrap();
        bus.publish("Order_DLQ", &event("o2")).await.unwrap();

        assert_eq!(bus.messages("Order_EVENTS").await.len(), 1);
        assert_eq!(bus.messages("Order_DLQ").await.len(), 1);
        assert!(bus.messages("Other_EVENTS").await.is_empty());
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish("Order_EVENTS", &event("o1")).await.unwrap();
        bus.publish("Order_EVENTS", &event("o2")).await.unwrap();

        let messages = bus.messages("Order_EVENTS").await;
        assert_eq!(messages[0].key, "o1");
        assert_eq!(messages[1].key, "o2");
    }
}
