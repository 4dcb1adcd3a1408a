use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use event_log::EventLog;
use outbox::{DeadLetterQueue, OutboxPublisher, OutboxStore};
use pipeline_engine::{EventBus, Pipeline};
use resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, ResilientInvoker, RetryPolicy};
use saga_store::SagaStore;
use timeout_scheduler::TimeoutScheduler;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use view_store::ViewStore;

use crate::capabilities::Capabilities;
use crate::config::RuntimeConfig;

/// The assembled runtime: every component the `RuntimeBuilder` wired together, plus
/// the background tasks spawned from it and the handle needed to stop them (§6
/// shutdown protocol).
pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) event_log: Arc<EventLog>,
    pub(crate) view_store: Arc<dyn ViewStore>,
    pub(crate) event_bus: Arc<dyn EventBus>,
    pub(crate) outbox: Arc<OutboxPublisher>,
    pub(crate) outbox_store: Arc<dyn OutboxStore>,
    pub(crate) dead_letters: Arc<dyn DeadLetterQueue>,
    pub(crate) saga_store: Arc<dyn SagaStore>,
    pub(crate) resilient_invoker_registry: Arc<CircuitBreakerRegistry>,
    pub(crate) timeout_scheduler: Arc<TimeoutScheduler>,
    pub(crate) pipelines: HashMap<String, Arc<Pipeline>>,
    pub(crate) shutdown_token: CancellationToken,
    pub(crate) background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn event_log(&self) -> Arc<EventLog> {
        self.event_log.clone()
    }

    pub fn view_store(&self) -> Arc<dyn ViewStore> {
        self.view_store.clone()
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        self.event_bus.clone()
    }

    pub fn outbox(&self) -> Arc<OutboxPublisher> {
        self.outbox.clone()
    }

    pub fn outbox_store(&self) -> Arc<dyn OutboxStore> {
        self.outbox_store.clone()
    }

    pub fn dead_letters(&self) -> Arc<dyn DeadLetterQueue> {
        self.dead_letters.clone()
    }

    pub fn saga_store(&self) -> Arc<dyn SagaStore> {
        self.saga_store.clone()
    }

    pub fn pipeline(&self, domain: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(domain).cloned()
    }

    /// A [`ResilientInvoker`] for calling out to `resource`, sharing this runtime's
    /// circuit breaker registry so repeated calls to the same resource see the same
    /// breaker (Component G, §4.8).
    pub fn resilient_invoker(&self, circuit_config: CircuitBreakerConfig, retry_policy: RetryPolicy) -> ResilientInvoker {
        ResilientInvoker::new(self.resilient_invoker_registry.clone(), circuit_config, retry_policy)
    }

    /// Spawns the runtime's long-lived background tasks: the timeout scheduler's
    /// sweep, the outbox drain loop, and nothing else here, since write-behind flush
    /// loops are only spawned when `capabilities.durable_persistence` actually
    /// fronted the view store with one (a plain `InMemoryViewStore` has nothing to
    /// flush). Call once; repeated calls spawn duplicate loops.
    pub fn spawn_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().unwrap();
        tasks.push(self.timeout_scheduler.clone().spawn(self.shutdown_token.clone()));
        tasks.push(self.outbox.clone().spawn(self.shutdown_token.clone()));
    }

    /// Runs the §6 shutdown protocol: stop ingress, drain in-flight stage work for
    /// every domain pipeline, flush the outbox once more, then signal background
    /// tasks to stop. Write-behind flushing is the responsibility of whatever
    /// `ViewStore`/durable-tier construction owns the `WriteBehindStore` handle,
    /// since this runtime only holds it behind the `dyn ViewStore` trait object.
    pub async fn shutdown(self) {
        info!("runtime shutdown: stopping ingress and draining pipelines");
        for (domain, pipeline) in self.pipelines {
            info!(domain, "draining pipeline");
            if let Ok(pipeline) = Arc::try_unwrap(pipeline) {
                pipeline.shutdown().await;
            }
        }

        let (published, dead_lettered) = self.outbox.drain_once().await;
        info!(published, dead_lettered, "final outbox drain before shutdown");

        self.shutdown_token.cancel();
        let tasks = std::mem::take(&mut *self.background_tasks.lock().unwrap());
        for task in tasks {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
        info!("runtime shutdown complete");
    }
}
