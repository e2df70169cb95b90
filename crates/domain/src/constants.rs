//! Default values for the client configuration
//!
//! Centralized so the config struct, the loader and the tests agree.

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_HALF_OPEN_RETRIES: u32 = 3;

// Request queue
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_OFFLINE_QUEUE_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_OFFLINE_POLL_INTERVAL_MS: u64 = 1_000;

// Response cache
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

// Retry / transport
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// Headers attached to every outbound request
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Environment variable prefix recognised by the config loader
pub const ENV_PREFIX: &str = "STEADFAST_";
