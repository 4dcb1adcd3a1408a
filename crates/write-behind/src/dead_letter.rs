use async_trait::async_trait;

/// Where a key's original payload is routed once flush retries are exhausted (§4.10
/// "Failure modes"). Kept as a trait so a runtime can point it at the `outbox` crate's
/// dead-letter queue or at a dedicated table.
#[async_trait]
pub trait WriteBehindDeadLetterSink<V>: Send + Sync {
    async fn park(&self, key: String, value: V, reason: String);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDeadLetterSink;

#[async_trait]
impl<V: Send + Sync> WriteBehindDeadLetterSink<V> for NoOpDeadLetterSink {
    async fn park(&self, key: String, _value: V, reason: String) {
        tracing::error!(key, reason, "write-behind flush exhausted retries, no dead-letter sink configured, dropping");
    }
}
