//! Time utilities and abstractions
//!
//! - **[`timer`]**: cancellable one-shot timers behind the [`Scheduler`]
//!   trait, with a Tokio-backed implementation for production and a
//!   manually-driven one for tests
//!
//! Clock abstractions live next to the circuit breaker in
//! [`crate::resilience`] and are re-exported here.

pub mod timer;

// Re-export commonly used items
pub use timer::{ManualScheduler, NoopScheduler, ScheduledTask, Scheduler, TimerHandle, TokioScheduler};

pub use crate::resilience::{Clock, MockClock, SystemClock};
