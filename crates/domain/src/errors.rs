//! Error types used throughout the workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Steadfast plumbing (configuration, transport setup)
///
/// Request-level failures have their own taxonomy in `steadfast-infra`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SteadfastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Steadfast operations
pub type Result<T> = std::result::Result<T, SteadfastError>;
