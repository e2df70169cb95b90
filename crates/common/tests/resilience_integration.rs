//! Integration tests for resilience module
//!
//! Drives circuit breakers and the registry through full failure/recovery
//! cycles on both the mock and the real clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use steadfast_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, MockClock,
    ResilienceError, RetryConfig, RetryDecision, Retryable,
};
use steadfast_common::time::{ManualScheduler, NoopScheduler};

/// Custom error type for testing
#[derive(Debug, Clone)]
struct TestError {
    message: String,
    retryable: bool,
}

impl TestError {
    fn transient(message: &str) -> Self {
        Self { message: message.to_string(), retryable: true }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

impl Retryable for TestError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Validates the canonical trip/cooldown scenario on the real clock.
///
/// # Test Steps
/// 1. Threshold 3, reset timeout 1000 ms
/// 2. Three failing calls open the breaker
/// 3. The fourth call is rejected without running
/// 4. After 1001 ms the fifth call runs and succeeds
#[tokio::test(flavor = "multi_thread")]
async fn test_trip_and_recover_after_cooldown() {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(3)
        .reset_timeout(Duration::from_millis(1000))
        .half_open_retries(1)
        .build()
        .unwrap();
    let breaker = CircuitBreaker::new(config).unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let result = breaker
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::transient("connection refused"))
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::OperationFailed { .. })));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let fourth = {
        let calls = Arc::clone(&calls);
        breaker
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>("live")
            })
            .await
    };
    assert!(matches!(fourth, Err(ResilienceError::CircuitOpen)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(1001)).await;

    let fifth = {
        let calls = Arc::clone(&calls);
        breaker
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>("live")
            })
            .await
    };
    assert_eq!(fifth.unwrap(), "live");
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Validates that the rejected fourth call can be answered by a fallback.
#[tokio::test]
async fn test_rejected_call_served_by_fallback() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        reset_timeout: Duration::from_millis(1000),
        half_open_retries: 1,
    };
    let breaker = CircuitBreaker::with_clock(config, clock.clone(), Arc::new(NoopScheduler)).unwrap();

    for _ in 0..3 {
        breaker.record_failure();
    }

    let result = breaker
        .execute_with_fallback(
            || async { Ok::<_, TestError>("live") },
            || async { Ok::<_, TestError>("fallback") },
        )
        .await;
    assert_eq!(result.unwrap(), "fallback");

    clock.advance(Duration::from_millis(1001));
    let result = breaker
        .execute_with_fallback(
            || async { Ok::<_, TestError>("live") },
            || async { Ok::<_, TestError>("fallback") },
        )
        .await;
    assert_eq!(result.unwrap(), "live");
}

/// Validates a full CLOSED → OPEN → HALF_OPEN → CLOSED cycle driven by the
/// reset timer alone.
#[tokio::test]
async fn test_full_cycle_with_manual_scheduler() {
    let clock = MockClock::new();
    let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        reset_timeout: Duration::from_secs(30),
        half_open_retries: 2,
    };
    let breaker = CircuitBreaker::with_clock(config, clock, scheduler.clone()).unwrap();

    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    scheduler.advance(Duration::from_secs(30));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    for _ in 0..2 {
        breaker.execute(|| async { Ok::<_, TestError>(()) }).await.unwrap();
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().failure_count, 0);
    assert_eq!(scheduler.pending(), 0);
}

/// Validates that breakers from one registry share configuration but not
/// state, and that concurrent callers for one key see the same breaker.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registry_shares_breaker_across_tasks() {
    let config = CircuitBreakerConfig { failure_threshold: 10, ..Default::default() };
    let registry = Arc::new(CircuitBreakerRegistry::new(config).unwrap());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let breaker = registry.get_or_create("https://api.test:443/courses");
                breaker
                    .execute(|| async { Err::<(), _>(TestError::transient("503")) })
                    .await
                    .unwrap_err();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.len(), 1);
    let shared = registry.get("https://api.test:443/courses").unwrap();
    assert_eq!(shared.state(), CircuitState::Open);
    assert_eq!(
        registry.get_or_create("https://api.test:443/bookings").state(),
        CircuitState::Closed
    );
}

/// Validates the retry schedule a caller-owned loop follows.
#[test]
fn test_retry_schedule_for_transient_errors() {
    let config = RetryConfig::exponential(3, Duration::from_millis(1000));
    let error = TestError::transient("timeout");

    let mut delays = Vec::new();
    let mut retries_done = 0;
    while let RetryDecision::RetryAfter(delay) = config.decide(&error, retries_done) {
        delays.push(delay);
        retries_done += 1;
    }

    assert_eq!(
        delays,
        vec![Duration::from_millis(1000), Duration::from_millis(2000), Duration::from_millis(4000)]
    );

    let permanent = TestError { message: "bad request".into(), retryable: false };
    assert_eq!(config.decide(&permanent, 0), RetryDecision::Stop);
}
