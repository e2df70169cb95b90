//! Client configuration
//!
//! Every option has a default, so a partial TOML/JSON document (or none at
//! all) yields a usable configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_RETRY_DELAY_MS, DEFAULT_CACHE_TTL_MS, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_HALF_OPEN_RETRIES, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES,
    DEFAULT_OFFLINE_POLL_INTERVAL_MS, DEFAULT_OFFLINE_QUEUE_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RESET_TIMEOUT_MS,
};
use crate::errors::{Result, SteadfastError};

/// Configuration recognised by the resilient client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix joined onto relative request paths (e.g. "https://api.example.com/v1")
    pub base_url: Option<String>,
    /// Consecutive failures before a breaker opens
    pub failure_threshold: u32,
    /// Time an open breaker waits before admitting a trial call
    pub reset_timeout_ms: u64,
    /// Successes needed in half-open state to close (also the half-open admission cap)
    pub half_open_retries: u32,
    /// Maximum in-flight HTTP attempts
    pub max_concurrent: usize,
    /// Lifetime of cached GET responses
    pub cache_ttl_ms: u64,
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// First backoff delay; doubled for every further retry
    pub base_retry_delay_ms: u64,
    /// Per-attempt timeout
    pub request_timeout_ms: u64,
    /// How long a request buffered while offline waits for connectivity
    pub offline_queue_timeout_ms: u64,
    /// How often a buffered request checks for connectivity
    pub offline_poll_interval_ms: u64,
    /// Optional User-Agent header value
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS,
            half_open_retries: DEFAULT_HALF_OPEN_RETRIES,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_ms: DEFAULT_BASE_RETRY_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            offline_queue_timeout_ms: DEFAULT_OFFLINE_QUEUE_TIMEOUT_MS,
            offline_poll_interval_ms: DEFAULT_OFFLINE_POLL_INTERVAL_MS,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn offline_queue_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_queue_timeout_ms)
    }

    pub fn offline_poll_interval(&self) -> Duration {
        Duration::from_millis(self.offline_poll_interval_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `SteadfastError::Config` naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("failure_threshold", u64::from(self.failure_threshold)),
            ("half_open_retries", u64::from(self.half_open_retries)),
            ("max_concurrent", self.max_concurrent as u64),
            ("request_timeout_ms", self.request_timeout_ms),
            ("offline_poll_interval_ms", self.offline_poll_interval_ms),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(SteadfastError::Config(format!("{name} must be greater than 0")));
            }
        }

        if let Some(base_url) = &self.base_url {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(SteadfastError::Config(format!(
                    "base_url must start with http:// or https://, got {base_url}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reset_timeout(), Duration::from_secs(60));
        assert_eq!(config.half_open_retries, 3);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_retry_delay(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.offline_queue_timeout(), Duration::from_secs(300));
        assert_eq!(config.offline_poll_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_thresholds() {
        let config = ClientConfig { failure_threshold: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(SteadfastError::Config(msg)) if msg.contains("failure_threshold")));

        let config = ClientConfig { max_concurrent: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = ClientConfig { half_open_retries: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_non_http_base_url() {
        let config =
            ClientConfig { base_url: Some("ftp://example.com".into()), ..Default::default() };
        assert!(config.validate().is_err());

        let config =
            ClientConfig { base_url: Some("https://example.com".into()), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: ClientConfig =
            toml::from_str("failure_threshold = 2\nmax_retries = 0\n").unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.cache_ttl_ms, DEFAULT_CACHE_TTL_MS);

        let config: ClientConfig = serde_json::from_str(r#"{"max_concurrent": 8}"#).unwrap();
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.reset_timeout_ms, DEFAULT_RESET_TIMEOUT_MS);
    }
}
