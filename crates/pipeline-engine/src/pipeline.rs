use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use event_log::EventLog;
use event_model::EventEnvelope;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use view_store::ViewStore;

use crate::completion::{CompletionHandle, CompletionOutcome, CompletionSender};
use crate::error::PipelineError;
use crate::gate::AdmissionGates;
use crate::metrics::PipelineMetrics;
use crate::partition::partition_of;
use crate::updater::UpdaterRegistry;

/// `publish_mode` (§6): direct bus publication, or routed through the transactional
/// outbox for must-deliver semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Direct,
    Outbox,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub partition_count: usize,
    pub ingress_capacity: usize,
    pub backpressure_wait_ms: u64,
    pub publish_mode: PublishMode,
    pub persist_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partition_count: 8,
            ingress_capacity: 1024,
            backpressure_wait_ms: 50,
            publish_mode: PublishMode::Direct,
            persist_max_attempts: 3,
        }
    }
}

/// Destination for PUBLISH when `publish_mode = Outbox`. Implemented by the `outbox`
/// crate; defined here so `pipeline-engine` has no dependency on it.
#[async_trait]
pub trait OutboxSink: Send + Sync {
    async fn enqueue(&self, destination: &str, event: &EventEnvelope) -> Result<(), PipelineError>;
}

use crate::bus::EventBus;

struct WorkItem {
    domain: String,
    key: String,
    event: EventEnvelope,
    enqueued_at: Instant,
    completion_tx: CompletionSender,
}

struct Shared {
    config: PipelineConfig,
    event_log: Arc<EventLog>,
    view_store: Arc<dyn ViewStore>,
    registry: Arc<UpdaterRegistry>,
    event_bus: Arc<dyn EventBus>,
    outbox: Option<Arc<dyn OutboxSink>>,
    metrics: Arc<PipelineMetrics>,
    gates: AdmissionGates,
}

/// The per-domain six-stage pipeline (Component C): SOURCE, ENRICH, PERSIST,
/// UPDATE_VIEW, PUBLISH, COMPLETE, run by one worker task per partition.
pub struct Pipeline {
    shared: Arc<Shared>,
    senders: Vec<mpsc::Sender<WorkItem>>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        event_log: Arc<EventLog>,
        view_store: Arc<dyn ViewStore>,
        registry: Arc<UpdaterRegistry>,
        event_bus: Arc<dyn EventBus>,
        outbox: Option<Arc<dyn OutboxSink>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            metrics: Arc::new(PipelineMetrics::new()),
            gates: AdmissionGates::new(),
            config: config.clone(),
            event_log,
            view_store,
            registry,
            event_bus,
            outbox,
        });

        let mut senders = Vec::with_capacity(config.partition_count);
        let mut workers = Vec::with_capacity(config.partition_count);
        for partition_id in 0..config.partition_count {
            let (tx, rx) = mpsc::channel(config.ingress_capacity);
            senders.push(tx);
            workers.push(tokio::spawn(run_worker(partition_id, rx, shared.clone())));
        }

        Self { shared, senders, workers }
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.shared.metrics.clone()
    }

    /// Submit an event for `(domain, key)`. Rejects with [`PipelineError::Backpressure`]
    /// if the target partition's ingress is full past `backpressure_wait_ms`.
    pub async fn submit(&self, domain: &str, key: &str, event: EventEnvelope) -> Result<CompletionHandle, PipelineError> {
        let partition = partition_of(domain, key, self.senders.len());
        let (completion_tx, completion_rx) = tokio::sync::oneshot::channel();
        let item = WorkItem {
            domain: domain.to_string(),
            key: key.to_string(),
            event,
            enqueued_at: Instant::now(),
            completion_tx,
        };

        let deadline = Duration::from_millis(self.shared.config.backpressure_wait_ms);
        match tokio::time::timeout(deadline, self.senders[partition].send(item)).await {
            Ok(Ok(())) => Ok(CompletionHandle::new(completion_rx)),
            _ => {
                self.shared.metrics.record(&self.shared.metrics.rejected);
                Err(PipelineError::Backpressure)
            }
        }
    }

    /// Suspends ingestion for `domain`, clears every view the domain's updaters write
    /// to, replays the domain's event log through UPDATE_VIEW only, then resumes
    /// ingestion (§4.3 "rebuild mode").
    pub async fn rebuild_views(&self, domain: &str) -> Result<(), PipelineError> {
        self.shared.gates.suspend(domain);

        let views: std::collections::BTreeSet<String> =
            self.shared.registry.all().map(|u| u.view().to_string()).collect();
        for view in &views {
            self.shared.view_store.clear(view).await.map_err(|e| PipelineError::Storage { reason: e.to_string() })?;
        }

        let registry = self.shared.registry.clone();
        let view_store = self.shared.view_store.clone();
        self.shared
            .event_log
            .replay_all(domain, move |_key, record| {
                let event = record.event.clone();
                let registry = registry.clone();
                let view_store = view_store.clone();
                // replay_all's visitor is synchronous; block_in_place keeps this off a
                // dedicated executor thread without requiring an async visitor contract.
                tokio::task::block_in_place(|| {
                    tokio::runtime::Handle::current().block_on(apply_updates(&registry, &view_store, &event))
                });
            })
            .await;

        self.shared.gates.resume(domain);
        Ok(())
    }

    pub async fn shutdown(self) {
        drop(self.senders);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn apply_updates(registry: &UpdaterRegistry, view_store: &Arc<dyn ViewStore>, event: &EventEnvelope) {
    for updater in registry.for_event_type(&event.event_type) {
        let key = updater.key_for(event);
        let event = event.clone();
        let outcome = view_store
            .atomic_update(updater.view(), &key, Box::new(move |current| updater.reduce(&event, current)))
            .await;
        if let Err(err) = outcome {
            error!(view = updater.view(), key, error = %err, "view update failed during rebuild");
        }
    }
}

async fn run_worker(partition_id: usize, mut rx: mpsc::Receiver<WorkItem>, shared: Arc<Shared>) {
    while let Some(item) = rx.recv().await {
        shared.gates.wait_for_admission(&item.domain).await;
        process_item(partition_id, item, &shared).await;
    }
}

async fn process_item(partition_id: usize, item: WorkItem, shared: &Arc<Shared>) {
    let WorkItem { domain, key, mut event, enqueued_at, completion_tx } = item;

    // SOURCE
    let wait = enqueued_at.elapsed();
    shared.metrics.record(&shared.metrics.source);
    debug!(partition_id, domain, key, wait_ms = wait.as_millis() as u64, "SOURCE");

    // ENRICH
    if event.event_version.is_empty() {
        event.event_version = "1.0".to_string();
    }
    shared.metrics.record(&shared.metrics.enrich);

    // PERSIST
    let sequence = match persist_with_retry(shared, &domain, &key, event.clone()).await {
        Ok(seq) => seq,
        Err(reject_reason) => {
            let _ = completion_tx.send(CompletionOutcome::Rejected { reason: reject_reason });
            return;
        }
    };
    shared.metrics.record(&shared.metrics.persist);

    // UPDATE_VIEW
    apply_updates(&shared.registry, &shared.view_store, &event).await;
    shared.metrics.record(&shared.metrics.update_view);

    // PUBLISH
    let topic = format!("{domain}_EVENTS");
    let publish_result = match shared.config.publish_mode {
        PublishMode::Direct => shared.event_bus.publish(&topic, &event).await,
        PublishMode::Outbox => match &shared.outbox {
            Some(outbox) => outbox.enqueue(&topic, &event).await,
            None => {
                warn!(domain, "publish_mode=Outbox but no OutboxSink configured, falling back to direct publish");
                shared.event_bus.publish(&topic, &event).await
            }
        },
    };
    if let Err(err) = publish_result {
        warn!(domain, key, error = %err, "PUBLISH failed, completion marker still written");
    }
    shared.metrics.record(&shared.metrics.publish);

    // COMPLETE
    shared.metrics.record(&shared.metrics.complete);
    let _ = completion_tx.send(CompletionOutcome::Accepted { sequence });
}

async fn persist_with_retry(shared: &Arc<Shared>, domain: &str, key: &str, event: EventEnvelope) -> Result<u64, String> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match shared.event_log.append(domain, key, event.clone()).await {
            Ok(seq) => return Ok(seq),
            Err(event_log::EventLogError::DuplicateEvent { .. }) => {
                let existing = shared
                    .event_log
                    .get_by_key(domain, key)
                    .await
                    .into_iter()
                    .enumerate()
                    .find(|(_, e)| e.event_id == event.event_id)
                    .map(|(idx, _)| idx as u64 + 1);
                return Ok(existing.unwrap_or(0));
            }
            Err(event_log::EventLogError::Validation { reason }) => return Err(reason),
            Err(event_log::EventLogError::Storage { reason }) => {
                if attempt >= shared.config.persist_max_attempts {
                    error!(domain, key, reason, "PERSIST retries exhausted, diverting to dead-letter");
                    let _ = shared
                        .event_bus
                        .publish(&format!("{domain}_DLQ"), &event)
                        .await;
                    return Err(format!("PERSIST failed after {attempt} attempts: {reason}"));
                }
                tokio::time::sleep(Duration::from_millis(25 * attempt as u64)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::updater::ViewUpdater;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use view_store::{InMemoryViewStore, UpdateOutcome};

    /// Projects `OrderCreated` payloads onto an `orders` view keyed by the event key;
    /// ignores every other event type per the updater contract (§4.4).
    struct OrdersViewUpdater;

    impl ViewUpdater for OrdersViewUpdater {
        fn view(&self) -> &str {
            "orders"
        }

        fn handles(&self, event_type: &str) -> bool {
            event_type == "OrderCreated"
        }

        fn key_for(&self, event: &EventEnvelope) -> String {
            event.key.clone()
        }

        fn reduce(&self, event: &EventEnvelope, _current: Option<&serde_json::Value>) -> UpdateOutcome {
            if !self.handles(&event.event_type) {
                return UpdateOutcome::Unchanged;
            }
            UpdateOutcome::Put(event.payload.clone())
        }
    }

    fn test_pipeline(config: PipelineConfig) -> (Pipeline, Arc<EventLog>, Arc<InMemoryViewStore>, Arc<InMemoryEventBus>) {
        let event_log = Arc::new(EventLog::new());
        let view_store = Arc::new(InMemoryViewStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let mut registry = UpdaterRegistry::new();
        registry.register(Arc::new(OrdersViewUpdater));

        let pipeline = Pipeline::new(
            config,
            event_log.clone(),
            view_store.clone() as Arc<dyn ViewStore>,
            Arc::new(registry),
            bus.clone() as Arc<dyn EventBus>,
            None,
        );
        (pipeline, event_log, view_store, bus)
    }

    fn order_created(key: &str) -> EventEnvelope {
        EventEnvelope::builder("OrderCreated", key)
            .source("order_service")
            .payload(serde_json::json!({"status": "NEW"}))
            .build()
    }

    #[tokio::test]
    async fn submit_runs_all_six_stages() {
        let (pipeline, event_log, view_store, bus) = test_pipeline(PipelineConfig::default());

        let handle = pipeline.submit("Order", "o1", order_created("o1")).await.unwrap();
        match handle.wait().await {
            CompletionOutcome::Accepted { sequence } => assert_eq!(sequence, 1),
            other => panic!("expected acceptance, got {other:?}"),
        }

        assert_eq!(event_log.get_by_key("Order", "o1").await.len(), 1);
        assert_eq!(view_store.get("orders", "o1").await.unwrap(), Some(serde_json::json!({"status": "NEW"})));
        assert_eq!(bus.messages("Order_EVENTS").await.len(), 1);

        let metrics = pipeline.metrics().snapshot();
        assert_eq!(metrics.source, 1);
        assert_eq!(metrics.persist, 1);
        assert_eq!(metrics.update_view, 1);
        assert_eq!(metrics.publish, 1);
        assert_eq!(metrics.complete, 1);
    }

    #[tokio::test]
    async fn events_missing_event_version_are_defaulted_by_enrich() {
        let (pipeline, event_log, _views, _bus) = test_pipeline(PipelineConfig::default());
        let mut event = order_created("o1");
        event.event_version = String::new();

        pipeline.submit("Order", "o1", event).await.unwrap().wait().await;

        let stored = event_log.get_by_key("Order", "o1").await;
        assert_eq!(stored[0].event_version, "1.0");
    }

    #[tokio::test]
    async fn duplicate_event_id_is_accepted_idempotently() {
        let (pipeline, event_log, _views, _bus) = test_pipeline(PipelineConfig::default());
        let event = order_created("o1");
        let event_id = event.event_id;

        pipeline.submit("Order", "o1", event.clone()).await.unwrap().wait().await;
        let outcome = pipeline.submit("Order", "o1", event).await.unwrap().wait().await;

        match outcome {
            CompletionOutcome::Accepted { sequence } => assert_eq!(sequence, 1),
            other => panic!("duplicate submission should still be accepted, got {other:?}"),
        }
        assert_eq!(event_log.get_by_key("Order", "o1").await.len(), 1, "no duplicate row should be stored");
        let _ = event_id;
    }

    #[tokio::test]
    async fn events_with_disjoint_keys_are_all_processed() {
        let (pipeline, _log, view_store, _bus) = test_pipeline(PipelineConfig { partition_count: 4, ..Default::default() });

        let mut handles = Vec::new();
        for i in 0..20 {
            let key = format!("o{i}");
            handles.push(pipeline.submit("Order", &key, order_created(&key)).await.unwrap());
        }
        for handle in handles {
            assert!(matches!(handle.wait().await, CompletionOutcome::Accepted { .. }));
        }

        let mut seen = 0;
        view_store.scan("orders", &mut |_, _| seen += 1).await.unwrap();
        assert_eq!(seen, 20);
    }

    #[tokio::test]
    async fn events_sharing_a_key_are_applied_in_submission_order() {
        let (pipeline, _log, view_store, _bus) = test_pipeline(PipelineConfig::default());

        for i in 0..10 {
            let event = EventEnvelope::builder("OrderCreated", "o1").payload(serde_json::json!({"seq": i})).build();
            pipeline.submit("Order", "o1", event).await.unwrap().wait().await;
        }

        assert_eq!(view_store.get("orders", "o1").await.unwrap(), Some(serde_json::json!({"seq": 9})));
    }

    #[tokio::test]
    async fn unknown_event_type_leaves_view_unchanged() {
        let (pipeline, _log, view_store, _bus) = test_pipeline(PipelineConfig::default());
        let event = EventEnvelope::builder("SomethingElse", "o1").payload(serde_json::json!({"x": 1})).build();

        pipeline.submit("Order", "o1", event).await.unwrap().wait().await;

        assert_eq!(view_store.get("orders", "o1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rebuild_views_replays_the_log_through_update_view_only() {
        let (pipeline, event_log, view_store, bus) = test_pipeline(PipelineConfig::default());

        pipeline.submit("Order", "o1", order_created("o1")).await.unwrap().wait().await;
        event_log
            .append(
                "Order",
                "o1",
                EventEnvelope::builder("OrderCreated", "o1").payload(serde_json::json!({"status": "UPDATED"})).build(),
            )
            .await
            .unwrap();

        // Clear the view out-of-band, as if a previous rebuild left it empty.
        view_store.clear("orders").await.unwrap();
        assert_eq!(view_store.get("orders", "o1").await.unwrap(), None);

        pipeline.rebuild_views("Order").await.unwrap();

        assert_eq!(view_store.get("orders", "o1").await.unwrap(), Some(serde_json::json!({"status": "UPDATED"})));
        // Rebuild must not re-publish or re-complete: only one publish happened, from the
        // original live submission.
        assert_eq!(bus.messages("Order_EVENTS").await.len(), 1);
    }

    #[tokio::test]
    async fn publish_mode_outbox_routes_through_the_configured_sink() {
        struct RecordingSink {
            count: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl OutboxSink for RecordingSink {
            async fn enqueue(&self, _destination: &str, _event: &EventEnvelope) -> Result<(), PipelineError> {
                self.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let event_log = Arc::new(EventLog::new());
        let view_store: Arc<dyn ViewStore> = Arc::new(InMemoryViewStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let mut registry = UpdaterRegistry::new();
        registry.register(Arc::new(OrdersViewUpdater));
        let sink_calls = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn OutboxSink> = Arc::new(RecordingSink { count: sink_calls.clone() });

        let pipeline = Pipeline::new(
            PipelineConfig { publish_mode: PublishMode::Outbox, ..Default::default() },
            event_log,
            view_store,
            Arc::new(registry),
            bus.clone(),
            Some(sink),
        );

        pipeline.submit("Order", "o1", order_created("o1")).await.unwrap().wait().await;

        assert_eq!(sink_calls.load(Ordering::SeqCst), 1);
        assert!(bus.messages("Order_EVENTS").await.is_empty(), "direct bus should not receive it when routed through the outbox");
    }

    #[tokio::test]
    async fn full_ingress_rejects_with_backpressure() {
        struct SlowViewStore(InMemoryViewStore);

        #[async_trait]
        impl ViewStore for SlowViewStore {
            async fn get(&self, view: &str, key: &str) -> Result<Option<serde_json::Value>, view_store::ViewStoreError> {
                self.0.get(view, key).await
            }
            async fn put(&self, view: &str, key: &str, record: serde_json::Value) -> Result<(), view_store::ViewStoreError> {
                self.0.put(view, key, record).await
            }
            async fn delete(&self, view: &str, key: &str) -> Result<(), view_store::ViewStoreError> {
                self.0.delete(view, key).await
            }
            async fn clear(&self, view: &str) -> Result<(), view_store::ViewStoreError> {
                self.0.clear(view).await
            }
            async fn scan(
                &self,
                view: &str,
                visitor: &mut (dyn FnMut(&str, &serde_json::Value) + Send),
            ) -> Result<(), view_store::ViewStoreError> {
                self.0.scan(view, visitor).await
            }
            async fn atomic_update(
                &self,
                view: &str,
                key: &str,
                f: Box<dyn FnOnce(Option<&serde_json::Value>) -> UpdateOutcome + Send>,
            ) -> Result<UpdateOutcome, view_store::ViewStoreError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.0.atomic_update(view, key, f).await
            }
        }

        let event_log = Arc::new(EventLog::new());
        let view_store: Arc<dyn ViewStore> = Arc::new(SlowViewStore(InMemoryViewStore::new()));
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let mut registry = UpdaterRegistry::new();
        registry.register(Arc::new(OrdersViewUpdater));

        let pipeline = Pipeline::new(
            PipelineConfig { partition_count: 1, ingress_capacity: 1, backpressure_wait_ms: 0, ..Default::default() },
            event_log,
            view_store,
            Arc::new(registry),
            bus,
            None,
        );

        // First submission is dequeued immediately and occupies the worker for 200ms.
        let _first = pipeline.submit("Order", "o1", order_created("o1")).await.unwrap();
        // Second fills the capacity-1 channel buffer.
        let _second = pipeline.submit("Order", "o2", order_created("o2")).await.unwrap();
        // Third has nowhere to go and a zero-millisecond wait, so it must be rejected.
        let third = pipeline.submit("Order", "o3", order_created("o3")).await;

        assert!(matches!(third, Err(PipelineError::Backpressure)));
    }
}
