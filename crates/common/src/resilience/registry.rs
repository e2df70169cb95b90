//! Registry of per-endpoint circuit breakers
//!
//! Replaces a process-wide breaker map with an explicit object the client
//! owns. Breakers are created lazily on first lookup and live as long as the
//! registry; `reset` exists for test teardown.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, ConfigResult, SystemClock,
};
use crate::time::{Scheduler, TokioScheduler};

/// One shared breaker per endpoint key
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    config: CircuitBreakerConfig,
    clock: Arc<C>,
    scheduler: Arc<dyn Scheduler>,
}

impl<C: Clock> fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

impl CircuitBreakerRegistry<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock, Arc::new(TokioScheduler))
    }
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Create a registry whose breakers share `clock` and `scheduler`
    pub fn with_clock(
        config: CircuitBreakerConfig,
        clock: C,
        scheduler: Arc<dyn Scheduler>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { breakers: DashMap::new(), config, clock: Arc::new(clock), scheduler })
    }

    /// Look up the breaker for `key`, creating it on first use
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self.breakers.entry(key.to_string()).or_insert_with(|| {
            debug!(endpoint = %key, "Creating circuit breaker");
            Arc::new(CircuitBreaker::from_parts(
                key,
                self.config.clone(),
                Arc::clone(&self.clock),
                Arc::clone(&self.scheduler),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Look up an existing breaker without creating one
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Endpoint keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.breakers.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Current state of every breaker, sorted by key
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<(String, CircuitState)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Drop every breaker (test teardown)
    pub fn reset(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        self.breakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::resilience::MockClock;
    use crate::time::ManualScheduler;

    fn registry() -> CircuitBreakerRegistry<MockClock> {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(5),
            half_open_retries: 1,
        };
        CircuitBreakerRegistry::with_clock(config, clock.clone(), Arc::new(ManualScheduler::new(clock)))
            .unwrap()
    }

    #[test]
    fn test_same_key_returns_same_breaker() {
        let registry = registry();
        let a = registry.get_or_create("https://api.test/courses");
        let b = registry.get_or_create("https://api.test/courses");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.name(), "https://api.test/courses");
    }

    #[test]
    fn test_breakers_are_isolated_per_key() {
        let registry = registry();
        let courses = registry.get_or_create("courses");
        let bookings = registry.get_or_create("bookings");

        courses.record_failure();
        courses.record_failure();

        assert_eq!(courses.state(), CircuitState::Open);
        assert_eq!(bookings.state(), CircuitState::Closed);
        assert_eq!(
            registry.states(),
            vec![
                ("bookings".to_string(), CircuitState::Closed),
                ("courses".to_string(), CircuitState::Open)
            ]
        );
    }

    #[test]
    fn test_concurrent_creation_yields_one_instance() {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_create("shared"))
            })
            .collect();

        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(breakers.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_clears_registry() {
        let registry = registry();
        registry.get_or_create("a").record_failure();
        registry.get_or_create("b");
        assert_eq!(registry.keys(), vec!["a".to_string(), "b".to_string()]);

        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.get("a").is_none());
        assert_eq!(registry.get_or_create("a").metrics().failure_count, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CircuitBreakerConfig { failure_threshold: 0, ..Default::default() };
        assert!(CircuitBreakerRegistry::new(config).is_err());
    }
}
