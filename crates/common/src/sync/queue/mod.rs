// Request queueing: bounded concurrency plus an offline buffer

mod core;
mod errors;
pub mod metrics;
pub mod offline;

pub use self::core::RequestQueue;
pub use self::errors::{QueueError, QueueResult};
pub use self::metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use self::offline::{OfflineBuffer, PendingRequest};
