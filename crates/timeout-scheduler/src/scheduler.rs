use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use saga_store::SagaStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::trigger::CompensationTrigger;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic deadline sweep (§4.7). Each tick queries [`SagaStore::past_deadline`],
/// CAS-wins each candidate into `COMPENSATING`, and hands winners to a
/// [`CompensationTrigger`]. Restart-safe: all state lives in the saga store, so a
/// crash mid-sweep just means the next tick re-discovers the same candidates.
pub struct TimeoutScheduler {
    store: Arc<dyn SagaStore>,
    trigger: Arc<dyn CompensationTrigger>,
    tick_interval: Duration,
}

impl TimeoutScheduler {
    pub fn new(store: Arc<dyn SagaStore>, trigger: Arc<dyn CompensationTrigger>) -> Self {
        Self { store, trigger, tick_interval: DEFAULT_TICK_INTERVAL }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Runs one sweep: past-deadline sagas are CAS'd to `COMPENSATING` and, for each
    /// that this call actually won, the compensation trigger fires. Returns the
    /// number of sagas this tick won the race on.
    pub async fn tick_once(&self) -> usize {
        let now = Utc::now();
        let candidates = self.store.past_deadline(now).await;
        let mut won = 0;

        for saga in candidates {
            match self.store.try_begin_timeout_compensation(saga.saga_id).await {
                Ok(true) => {
                    won += 1;
                    let Some(saga) = self.store.get(saga.saga_id).await else { continue };
                    if let Err(err) = self.trigger.trigger(&saga).await {
                        error!(saga_id = %saga.saga_id, error = %err, "timeout compensation trigger failed");
                    }
                }
                Ok(false) => {
                    debug!(saga_id = %saga.saga_id, "lost timeout CAS race, another actor handled it");
                }
                Err(err) => {
                    error!(saga_id = %saga.saga_id, error = %err, "timeout CAS failed");
                }
            }
        }

        won
    }

    /// Spawns the scheduler as a long-lived task with its own cancellation; shutdown
    /// cancels the token and the task exits after its current tick completes.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(tick_interval = ?self.tick_interval, "timeout scheduler started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("timeout scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let won = self.tick_once().await;
                        if won > 0 {
                            debug!(won, "timeout sweep triggered compensation");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::CompensationTrigger;
    use async_trait::async_trait;
    use saga_store::{InMemorySagaStore, SagaInstance, SagaStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingTrigger(Arc<AtomicUsize>);

    #[async_trait]
    impl CompensationTrigger for CountingTrigger {
        async fn trigger(&self, _saga: &SagaInstance) -> Result<(), crate::error::SchedulerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn tick_fires_trigger_once_per_expired_saga() {
        let store: Arc<dyn SagaStore> = Arc::new(InMemorySagaStore::new());
        let saga_id = Uuid::new_v4();
        store.start(saga_id, "OrderFulfillment", None, 2, Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = TimeoutScheduler::new(store.clone(), Arc::new(CountingTrigger(count.clone())));

        let won = scheduler.tick_once().await;
        assert_eq!(won, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let saga = store.get(saga_id).await.unwrap();
        assert_eq!(saga.status, SagaStatus::Compensating);
        assert_eq!(saga.failure_reason.as_deref(), Some("TIMEOUT"));
    }

    #[tokio::test]
    async fn second_tick_does_not_refire_already_compensating_saga() {
        let store: Arc<dyn SagaStore> = Arc::new(InMemorySagaStore::new());
        let saga_id = Uuid::new_v4();
        store.start(saga_id, "OrderFulfillment", None, 2, Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = TimeoutScheduler::new(store.clone(), Arc::new(CountingTrigger(count.clone())));

        scheduler.tick_once().await;
        let second = scheduler.tick_once().await;

        assert_eq!(second, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawned_task_stops_on_cancellation() {
        let store: Arc<dyn SagaStore> = Arc::new(InMemorySagaStore::new());
        let scheduler = Arc::new(
            TimeoutScheduler::new(store, Arc::new(crate::trigger::NoOpCompensationTrigger))
                .with_tick_interval(Duration::from_millis(10)),
        );
        let token = CancellationToken::new();
        let handle = scheduler.spawn(token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
