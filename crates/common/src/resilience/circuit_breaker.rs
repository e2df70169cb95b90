//! Circuit breaker for outbound calls
//!
//! One breaker guards one logical endpoint. It counts failures while closed,
//! rejects calls while open, and admits a limited number of trial calls while
//! half-open. The open → half-open transition is driven both by a scheduled
//! timer and by an elapsed-time check on every call; both read the same
//! `reset_timeout`, so whichever fires first wins and they never disagree.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::time::{Scheduler, TimerHandle, TokioScheduler};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Breakers and caches read time only through this trait, so tests can
/// move time forward without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can hand one clone to a
/// breaker and keep another to advance it.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors that can occur in resilience operations
///
/// Generic over the wrapped operation error so the original failure is
/// preserved untouched.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing limited requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) before opening the circuit
    pub failure_threshold: u64,
    /// Time to wait before transitioning from open to half-open
    pub reset_timeout: Duration,
    /// Successes needed to close from half-open; also caps the calls
    /// admitted per half-open window
    pub half_open_retries: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout: Duration::from_secs(60), half_open_retries: 3 }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.half_open_retries == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_retries must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn half_open_retries(mut self, retries: u64) -> Self {
        self.config.half_open_retries = retries;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub half_open_attempts: u64,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

/// Mutable breaker state; every transition happens under one lock.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    half_open_attempts: u64,
    last_failure_time: Option<Instant>,
    state_change_time: Instant,
    /// Bumped on every arm so a superseded timer cannot flip a newer window
    generation: u64,
    reset_timer: Option<TimerHandle>,
}

impl BreakerState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_attempts: 0,
            last_failure_time: None,
            state_change_time: now,
            generation: 0,
            reset_timer: None,
        }
    }

    fn enter_half_open(&mut self, now: Instant) {
        self.state = CircuitState::HalfOpen;
        self.success_count = 0;
        self.half_open_attempts = 0;
        self.state_change_time = now;
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.reset_timer.take() {
            timer.cancel();
        }
    }
}

/// Circuit breaker guarding a single endpoint
///
/// Generic over the [`Clock`] so tests can drive the cooldown with a
/// [`MockClock`]; the reset timer goes through an injected [`Scheduler`].
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
    total_calls: AtomicU64,
    rejected_calls: AtomicU64,
    clock: Arc<C>,
    scheduler: Arc<dyn Scheduler>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &state.state)
            .field("failure_count", &state.failure_count)
            .field("success_count", &state.success_count)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock with Tokio-driven reset timers
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock, Arc::new(TokioScheduler))
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock and scheduler
    pub fn with_clock(
        config: CircuitBreakerConfig,
        clock: C,
        scheduler: Arc<dyn Scheduler>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_parts("default", config, Arc::new(clock), scheduler))
    }

    /// Build from an already-validated config (used by the registry)
    pub(crate) fn from_parts(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<C>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(BreakerState::new(now))),
            total_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            clock,
            scheduler,
        }
    }

    /// Set the name used in log output
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Fast check: anything but OPEN
    pub fn is_available(&self) -> bool {
        self.inner.lock().state != CircuitState::Open
    }

    /// Ask for permission to make one call
    ///
    /// OPEN past its cooldown moves to HALF_OPEN and the caller becomes the
    /// first trial call. HALF_OPEN admits up to `half_open_retries` calls per
    /// window.
    pub fn try_acquire(&self) -> bool {
        self.admit().is_some()
    }

    /// Admission check; `Some(window)` names the HALF_OPEN window a trial
    /// call was admitted into, `Some(None)` a CLOSED admission
    fn admit(&self) -> Option<Option<Instant>> {
        let now = self.clock.now();
        let mut state = self.inner.lock();

        match state.state {
            CircuitState::Closed => Some(None),
            CircuitState::Open => {
                let cooled_down = state
                    .last_failure_time
                    .map_or(true, |failed_at| now.duration_since(failed_at) >= self.config.reset_timeout);
                if !cooled_down {
                    return None;
                }
                state.cancel_timer();
                state.enter_half_open(now);
                state.half_open_attempts = 1;
                info!(breaker = %self.name, "Circuit breaker half-open after cooldown");
                Some(Some(state.state_change_time))
            }
            CircuitState::HalfOpen => {
                if state.half_open_attempts < self.config.half_open_retries {
                    state.half_open_attempts += 1;
                    Some(Some(state.state_change_time))
                } else {
                    None
                }
            }
        }
    }

    /// A trial call admitted into the HALF_OPEN window opened at `window`
    /// never reported back; treat it as a failed trial
    fn abandon_trial(&self, window: Instant) {
        let now = self.clock.now();
        let mut state = self.inner.lock();
        if state.state != CircuitState::HalfOpen || state.state_change_time != window {
            return;
        }
        state.last_failure_time = Some(now);
        self.trip_locked(&mut state, now);
        warn!(breaker = %self.name, "Circuit breaker re-opened: half-open trial call was cancelled");
    }

    /// Execute an operation with circuit breaker protection
    #[instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Some(window) = self.admit() else {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            debug!("Circuit breaker rejecting call - state: {}", self.state());
            return Err(ResilienceError::CircuitOpen);
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        // Dropping this future mid-call must still give the trial slot back
        let mut trial = TrialGuard { breaker: self, window };
        let outcome = operation().await;
        trial.window = None;

        match outcome {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                debug!(error = %error, "Circuit breaker: operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Execute with a fallback
    ///
    /// The fallback runs when the call is rejected, or when the call fails
    /// and that failure left the breaker OPEN. Any other failure is returned
    /// unchanged.
    #[instrument(skip(self, operation, fallback), fields(breaker = %self.name))]
    pub async fn execute_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.execute(operation).await {
            Err(ResilienceError::CircuitOpen) => {
                debug!("Circuit open, using fallback");
                fallback().await.map_err(|source| ResilienceError::OperationFailed { source })
            }
            Err(ResilienceError::OperationFailed { source }) => {
                if self.state() == CircuitState::Open {
                    debug!(error = %source, "Circuit tripped, using fallback");
                    fallback().await.map_err(|source| ResilienceError::OperationFailed { source })
                } else {
                    Err(ResilienceError::OperationFailed { source })
                }
            }
            ok => ok,
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut state = self.inner.lock();

        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.half_open_retries {
                    let successes = state.success_count;
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.half_open_attempts = 0;
                    state.state_change_time = now;
                    state.cancel_timer();
                    info!(breaker = %self.name, "Circuit breaker closed after {} successes", successes);
                }
            }
            CircuitState::Open => {
                // A call admitted before the trip finished late
                debug!(breaker = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut state = self.inner.lock();
        state.last_failure_time = Some(now);

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    let failures = state.failure_count;
                    self.trip_locked(&mut state, now);
                    warn!(breaker = %self.name, "Circuit breaker opened after {} failures", failures);
                }
            }
            CircuitState::HalfOpen => {
                self.trip_locked(&mut state, now);
                warn!(breaker = %self.name, "Circuit breaker re-opened by failure in half-open state");
            }
            CircuitState::Open => {
                // Cooldown restarts from this failure; keep the timer in step
                self.arm_reset_timer(&mut state);
            }
        }
    }

    /// Force the breaker OPEN and arm the reset timer
    pub fn trip(&self) {
        let now = self.clock.now();
        let mut state = self.inner.lock();
        state.last_failure_time = Some(now);
        self.trip_locked(&mut state, now);
        warn!(breaker = %self.name, "Circuit breaker tripped");
    }

    fn trip_locked(&self, state: &mut BreakerState, now: Instant) {
        state.state = CircuitState::Open;
        state.success_count = 0;
        state.half_open_attempts = 0;
        state.state_change_time = now;
        self.arm_reset_timer(state);
    }

    fn arm_reset_timer(&self, state: &mut BreakerState) {
        state.cancel_timer();
        state.generation += 1;

        let generation = state.generation;
        let inner: Weak<Mutex<BreakerState>> = Arc::downgrade(&self.inner);
        let clock = Arc::clone(&self.clock);
        let name = self.name.clone();

        let handle = self.scheduler.schedule(
            self.config.reset_timeout,
            Box::new(move || {
                let Some(inner) = inner.upgrade() else { return };
                let mut state = inner.lock();
                if state.state == CircuitState::Open && state.generation == generation {
                    state.reset_timer = None;
                    state.enter_half_open(clock.now());
                    info!(breaker = %name, "Circuit breaker half-open (reset timer)");
                }
            }),
        );
        state.reset_timer = Some(handle);
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.inner.lock();
        CircuitBreakerMetrics {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            half_open_attempts: state.half_open_attempts,
            total_calls: self.total_calls.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Acquire),
            last_failure_time: state.last_failure_time,
            state_change_time: state.state_change_time,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.inner.lock();
        state.cancel_timer();
        let generation = state.generation + 1;
        *state = BreakerState::new(now);
        state.generation = generation;
        info!(breaker = %self.name, "Circuit breaker manually reset to closed state");
    }
}

/// Reports a HALF_OPEN trial as failed if its call is dropped before it
/// completes
struct TrialGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    window: Option<Instant>,
}

impl<C: Clock> Drop for TrialGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(window) = self.window.take() {
            self.breaker.abandon_trial(window);
        }
    }
}

impl<C: Clock> Drop for CircuitBreaker<C> {
    fn drop(&mut self) {
        self.inner.lock().cancel_timer();
    }
}
