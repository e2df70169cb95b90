//! API-specific error types
//!
//! Every failure a caller of the resilient client can see, with enough
//! classification to decide whether to retry, degrade, or surface it.

use std::collections::BTreeMap;
use std::time::Duration;

use steadfast_common::resilience::Retryable;
use steadfast_domain::SteadfastError;
use thiserror::Error;

/// Response headers, lower-cased names
pub type Headers = BTreeMap<String, String>;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCategory {
    /// Authentication errors (401, 403) - non-retryable
    Authentication,
    /// Rate limiting errors (429) - non-retryable at this layer
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors and timeouts - retryable
    Network,
    /// Breaker denied or tripped - non-retryable
    Circuit,
    /// Offline buffering gave up or was cancelled
    Queue,
    /// Configuration or payload errors - non-retryable
    Config,
}

/// API operation errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String, headers: Headers },

    #[error("Client error {status}: {body}")]
    Client { status: u16, body: String, headers: Headers },

    #[error("Authentication failed ({status}): {body}")]
    Auth { status: u16, body: String, headers: Headers },

    #[error("Rate limit exceeded: {body}")]
    RateLimit { body: String, headers: Headers },

    /// The endpoint's breaker refused the call and nothing could stand in
    #[error("Circuit breaker open for {endpoint}")]
    CircuitOpen { endpoint: String },

    /// This failure tripped the breaker and nothing could stand in
    #[error("Service unavailable at {endpoint}: {source}")]
    ServiceUnavailable {
        endpoint: String,
        #[source]
        source: Box<ApiError>,
    },

    /// A request buffered while offline was never dispatched
    #[error("Request queued offline for {0:?} without connectivity")]
    QueueTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to decode payload: {0}")]
    Decode(String),
}

impl ApiError {
    /// Get the error category for this error
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Auth { .. } => ApiErrorCategory::Authentication,
            Self::RateLimit { .. } => ApiErrorCategory::RateLimit,
            Self::Server { .. } => ApiErrorCategory::Server,
            Self::Client { .. } => ApiErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => ApiErrorCategory::Network,
            Self::CircuitOpen { .. } | Self::ServiceUnavailable { .. } => ApiErrorCategory::Circuit,
            Self::QueueTimeout(_) | Self::Cancelled => ApiErrorCategory::Queue,
            Self::Config(_) | Self::Decode(_) => ApiErrorCategory::Config,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ApiErrorCategory::Server | ApiErrorCategory::Network)
    }

    /// No response at all (as opposed to an error status)
    pub fn is_network(&self) -> bool {
        self.category() == ApiErrorCategory::Network
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Client { status, .. } | Self::Auth { status, .. } => {
                Some(*status)
            }
            Self::RateLimit { .. } => Some(429),
            Self::ServiceUnavailable { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Response headers carried by the error, if a response was received
    pub fn headers(&self) -> Option<&Headers> {
        match self {
            Self::Server { headers, .. }
            | Self::Client { headers, .. }
            | Self::Auth { headers, .. }
            | Self::RateLimit { headers, .. } => Some(headers),
            Self::ServiceUnavailable { source, .. } => source.headers(),
            _ => None,
        }
    }

    /// Map a non-success status to its error kind
    pub fn from_status(status: u16, body: String, headers: Headers) -> Self {
        match status {
            401 | 403 => Self::Auth { status, body, headers },
            429 => Self::RateLimit { body, headers },
            500..=599 => Self::Server { status, body, headers },
            _ => Self::Client { status, body, headers },
        }
    }
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        ApiError::is_retryable(self)
    }
}

impl From<SteadfastError> for ApiError {
    fn from(err: SteadfastError) -> Self {
        match err {
            SteadfastError::Network(message) => Self::Network(message),
            SteadfastError::Config(message) | SteadfastError::InvalidInput(message) => {
                Self::Config(message)
            }
            SteadfastError::Internal(message) => Self::Network(message),
        }
    }
}
