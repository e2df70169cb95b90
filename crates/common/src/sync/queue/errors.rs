use thiserror::Error;

/// Queue operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The task was dropped (or panicked) before producing its output
    #[error("Queued task was dropped before completing")]
    TaskDropped,

    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
