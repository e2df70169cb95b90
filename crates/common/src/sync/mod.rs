//! Scheduling of outbound work
//!
//! ## Submodules
//!
//! - **`queue`**: [`RequestQueue`] caps how many requests are in flight;
//!   [`OfflineBuffer`] holds non-idempotent requests issued while offline
//!   until they can be replayed

pub mod queue;

pub use queue::{
    OfflineBuffer, PendingRequest, QueueError, QueueMetrics, QueueMetricsSnapshot, QueueResult,
    RequestQueue,
};
