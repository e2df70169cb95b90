//! TTL response cache
//!
//! A thread-safe map from request signature to a previously captured value.
//! Entries expire `ttl` after insertion; there is no size bound and no
//! background sweeper. Expired entries are dropped lazily by `get` and in
//! bulk by every `set`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::stats::{CacheStats, MetricsCollector};
use crate::resilience::{Clock, SystemClock};

/// Entry stored in the cache
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// Thread-safe TTL cache keyed by request signature
///
/// # Type Parameters
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
pub struct ResponseCache<V, C = SystemClock>
where
    V: Clone,
    C: Clock,
{
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    metrics: MetricsCollector,
    clock: Arc<C>,
}

impl<V: Clone, C: Clock> fmt::Debug for ResponseCache<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache").field("ttl", &self.ttl).field("len", &self.len()).finish()
    }
}

impl<V: Clone> ResponseCache<V, SystemClock> {
    /// Create a new cache on the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<V, C> ResponseCache<V, C>
where
    V: Clone,
    C: Clock,
{
    /// Create a new cache with a custom clock (useful for testing)
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            metrics: MetricsCollector::new(),
            clock: Arc::new(clock),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a value, replacing any previous entry for the key
    ///
    /// Every expired entry is swept first.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        self.metrics.record_expirations(before - entries.len());

        let key = key.into();
        trace!(key = %key, "Caching response");
        entries.insert(key, CacheEntry { value, inserted_at: now });
        self.metrics.record_insert();
    }

    /// Get a value from the cache
    ///
    /// Returns `None` if the key doesn't exist or if the entry has expired;
    /// an expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) => entry.is_expired(now, self.ttl),
        };

        if expired {
            entries.remove(key);
            self.metrics.record_miss();
            self.metrics.record_expirations(1);
            trace!(key = %key, "Cached response expired");
            return None;
        }

        self.metrics.record_hit();
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove a value from the cache
    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().remove(key).map(|entry| entry.value)
    }

    /// Clear all entries and statistics
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.metrics.reset();
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        let removed = before - entries.len();
        self.metrics.record_expirations(removed);
        removed
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::MockClock;

    fn cache() -> (ResponseCache<String, MockClock>, MockClock) {
        let clock = MockClock::new();
        (ResponseCache::with_clock(Duration::from_secs(300), clock.clone()), clock)
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _clock) = cache();
        cache.set("GET /courses", "payload".to_string());

        assert_eq!(cache.get("GET /courses").as_deref(), Some("payload"));
        assert_eq!(cache.get("GET /missing"), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.inserts, stats.size), (1, 1, 1, 1));
    }

    #[test]
    fn test_entry_lives_exactly_ttl() {
        let (cache, clock) = cache();
        cache.set("k", "v".to_string());

        clock.advance(Duration::from_secs(300));
        assert!(cache.get("k").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_set_sweeps_expired_entries() {
        let (cache, clock) = cache();
        cache.set("old-1", "a".to_string());
        cache.set("old-2", "b".to_string());

        clock.advance(Duration::from_secs(200));
        cache.set("young", "c".to_string());
        clock.advance(Duration::from_secs(101));
        assert_eq!(cache.len(), 3);

        cache.set("new", "d".to_string());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("young").is_some());
        assert_eq!(cache.stats().expirations, 2);
    }

    #[test]
    fn test_overwrite_refreshes_insertion_time() {
        let (cache, clock) = cache();
        cache.set("k", "first".to_string());
        clock.advance(Duration::from_secs(250));
        cache.set("k", "second".to_string());
        clock.advance(Duration::from_secs(250));

        assert_eq!(cache.get("k").as_deref(), Some("second"));
    }

    #[test]
    fn test_cleanup_remove_and_clear() {
        let (cache, clock) = cache();
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        assert_eq!(cache.remove("a").as_deref(), Some("1"));
        assert_eq!(cache.remove("a"), None);

        clock.advance(Duration::from_secs(301));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.cleanup_expired(), 0);

        cache.set("c", "3".to_string());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
