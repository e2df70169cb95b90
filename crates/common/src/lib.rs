//! HTTP-agnostic resilience primitives shared by Steadfast crates.
//!
//! - [`resilience`]: circuit breaker, per-endpoint registry, retry schedule
//! - [`cache`]: TTL response cache and request signatures
//! - [`sync`]: bounded-concurrency request queue and offline buffer
//! - [`time`]: clock and cancellable one-shot timers
//!
//! Everything that depends on time reads it through
//! [`Clock`](resilience::Clock) and schedules through
//! [`Scheduler`](time::Scheduler), so tests can run deterministically on
//! [`MockClock`](resilience::MockClock) and
//! [`ManualScheduler`](time::ManualScheduler).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cache;
pub mod resilience;
pub mod sync;
pub mod time;

pub use cache::{request_signature, CacheStats, ResponseCache};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, Clock,
    MockClock, ResilienceError, RetryConfig, SystemClock,
};
pub use sync::{OfflineBuffer, PendingRequest, QueueError, RequestQueue};
pub use time::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
