use std::sync::atomic::{AtomicU64, Ordering};

/// Per-stage transition counters (§4.3 "a stage emits structured metrics at each
/// transition"). Counters are cheap enough to update on the hot path; richer timing
/// lives in `tracing` spans around each stage.
#[derive(Default)]
pub struct PipelineMetrics {
    pub source: AtomicU64,
    pub enrich: AtomicU64,
    pub persist: AtomicU64,
    pub update_view: AtomicU64,
    pub publish: AtomicU64,
    pub complete: AtomicU64,
    pub rejected: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            source: self.source.load(Ordering::Relaxed),
            enrich: self.enrich.load(Ordering::Relaxed),
            persist: self.persist.load(Ordering::Relaxed),
            update_view: self.update_view.load(Ordering::Relaxed),
            publish: self.publish.load(Ordering::Relaxed),
            complete: self.complete.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineMetricsSnapshot {
    pub source: u64,
    pub enrich: u64,
    pub persist: u64,
    pub update_view: u64,
    pub publish: u64,
    pub complete: u64,
    pub rejected: u64,
}
