//! Cache statistics and metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries (expired-but-unswept entries included)
    pub size: usize,

    /// Total number of successful get operations
    pub hits: u64,

    /// Total number of failed get operations (key not found or expired)
    pub misses: u64,

    /// Total number of insert operations
    pub inserts: u64,

    /// Total number of expired entries removed
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit rate (hits / total accesses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of access operations (hits + misses)
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    expirations: AtomicU64,
}

impl MetricsCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: usize) {
        if count > 0 {
            self.expirations.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Get current statistics snapshot
    pub(crate) fn snapshot(&self, size: usize) -> CacheStats {
        CacheStats {
            size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hit rate is hits over all lookups and zero before any lookup.
    #[test]
    fn test_hit_rate_calculation() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);

        let stats = CacheStats { hits: 80, misses: 20, ..Default::default() };
        assert!((stats.hit_rate() - 0.8).abs() < 1e-10);
        assert_eq!(stats.total_accesses(), 100);
    }

    /// Snapshots reflect recorded events; reset zeroes them.
    #[test]
    fn test_collector_snapshot_and_reset() {
        let collector = MetricsCollector::new();
        collector.record_hit();
        collector.record_miss();
        collector.record_miss();
        collector.record_insert();
        collector.record_expirations(3);
        collector.record_expirations(0);

        let stats = collector.snapshot(7);
        assert_eq!(stats, CacheStats { size: 7, hits: 1, misses: 2, inserts: 1, expirations: 3 });

        collector.reset();
        assert_eq!(collector.snapshot(0), CacheStats::default());
    }
}
