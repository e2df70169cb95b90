//! Resilience patterns for outbound calls
//!
//! - **Circuit Breaker**: stops calling an endpoint that keeps failing and
//!   probes it again after a cooldown
//! - **Registry**: one breaker per endpoint key, shared by every caller
//! - **Retry**: exponential backoff schedule and retry budget
//!
//! Everything here is generic over the wrapped error type and reads time
//! through [`Clock`], so tests can use [`MockClock`].

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, Clock, ConfigError, ConfigResult, MockClock, ResilienceError, ResilienceResult,
    SystemClock,
};
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryConfig, RetryDecision, RetryError, Retryable};
