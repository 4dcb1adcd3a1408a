use std::sync::atomic::{AtomicU64, Ordering};

/// Queue depth, pending bytes, flush latency, error rate, evictions per second (§4.10
/// "Metrics"). Latency is tracked as a running total plus a count so callers can
/// derive an average without pulling in a histogram dependency.
#[derive(Default)]
pub struct WriteBehindMetrics {
    pub queue_depth: AtomicU64,
    pub pending_bytes: AtomicU64,
    pub flush_count: AtomicU64,
    pub flush_latency_micros_total: AtomicU64,
    pub flush_errors: AtomicU64,
    pub evictions: AtomicU64,
    pub dead_lettered: AtomicU64,
}

impl WriteBehindMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_flush(&self, latency_micros: u64, ok: bool) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        self.flush_latency_micros_total.fetch_add(latency_micros, Ordering::Relaxed);
        if !ok {
            self.flush_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriteBehindMetricsSnapshot {
        let flush_count = self.flush_count.load(Ordering::Relaxed);
        let latency_total = self.flush_latency_micros_total.load(Ordering::Relaxed);
        WriteBehindMetricsSnapshot {
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            pending_bytes: self.pending_bytes.load(Ordering::Relaxed),
            flush_count,
            avg_flush_latency_micros: if flush_count == 0 { 0 } else { latency_total / flush_count },
            flush_errors: self.flush_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteBehindMetricsSnapshot {
    pub queue_depth: u64,
    pub pending_bytes: u64,
    pub flush_count: u64,
    pub avg_flush_latency_micros: u64,
    pub flush_errors: u64,
    pub evictions: u64,
    pub dead_lettered: u64,
}
