use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

/// Queue metrics for monitoring
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub total_enqueued: AtomicU64,
    pub total_started: AtomicU64,
    pub total_completed: AtomicU64,
    pub peak_active: AtomicUsize,
}

impl QueueMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueue(&self) {
        self.total_enqueued.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a task taking a slot; `active` includes it
    pub fn record_start(&self, active: usize) {
        self.total_started.fetch_add(1, AtomicOrdering::Relaxed);
        self.peak_active.fetch_max(active, AtomicOrdering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.total_completed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Combine counters with the live gauges read under the queue lock
    pub fn snapshot(&self, active: usize, pending: usize) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            active,
            pending,
            peak_active: self.peak_active.load(AtomicOrdering::Relaxed),
            total_enqueued: self.total_enqueued.load(AtomicOrdering::Relaxed),
            total_started: self.total_started.load(AtomicOrdering::Relaxed),
            total_completed: self.total_completed.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Point-in-time view of a [`RequestQueue`](super::RequestQueue)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub active: usize,
    pub pending: usize,
    pub peak_active: usize,
    pub total_enqueued: u64,
    pub total_started: u64,
    pub total_completed: u64,
}

impl QueueMetricsSnapshot {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "active={} pending={} peak={} enqueued={} completed={}",
            self.active, self.pending, self.peak_active, self.total_enqueued, self.total_completed
        )
    }
}
