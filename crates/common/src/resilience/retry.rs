//! Retry scheduling with exponential backoff
//!
//! The caller owns the loop; this module only answers "may I retry, and how
//! long do I wait first". Retry numbers are 1-based: the first retry (second
//! attempt) is retry 1.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while building a retry configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The retry strategy configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation after the given delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to retry and how long to wait between attempts
///
/// Retry `k` waits `base_delay * 2^(k - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

impl RetryConfig {
    /// Exponential backoff from `base_delay` with a one-hour ceiling
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay, max_delay: Duration::from_secs(3600) }
    }

    /// Whether a request that has already been retried `retries_done` times
    /// may be retried again
    pub fn can_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent).min(self.max_delay)
    }

    /// Combine the budget with the error's own verdict
    pub fn decide<E: Retryable>(&self, error: &E, retries_done: u32) -> RetryDecision {
        if !self.can_retry(retries_done) || !error.is_retryable() {
            return RetryDecision::Stop;
        }
        RetryDecision::RetryAfter(self.delay_for(retries_done + 1))
    }

    pub fn validate(&self) -> Result<(), RetryError> {
        if self.max_delay < self.base_delay {
            return Err(RetryError::InvalidConfiguration {
                message: "max_delay must not be shorter than base_delay".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Transient(bool);

    impl Retryable for Transient {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_exponential_doubles_from_base() {
        let config = RetryConfig::exponential(3, Duration::from_millis(1000));
        assert_eq!(config.delay_for(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_exponential_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        };
        assert_eq!(config.delay_for(3), Duration::from_millis(250));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_millis(250));
    }

    #[test]
    fn test_budget() {
        let config = RetryConfig::exponential(2, Duration::from_millis(10));
        assert!(config.can_retry(0));
        assert!(config.can_retry(1));
        assert!(!config.can_retry(2));
        assert!(!RetryConfig::exponential(0, Duration::ZERO).can_retry(0));
    }

    #[test]
    fn test_decide_respects_error_and_budget() {
        let config = RetryConfig::exponential(2, Duration::from_millis(10));

        assert_eq!(
            config.decide(&Transient(true), 0),
            RetryDecision::RetryAfter(Duration::from_millis(10))
        );
        assert_eq!(
            config.decide(&Transient(true), 1),
            RetryDecision::RetryAfter(Duration::from_millis(20))
        );
        assert_eq!(config.decide(&Transient(true), 2), RetryDecision::Stop);
        assert_eq!(config.decide(&Transient(false), 0), RetryDecision::Stop);
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        let config = RetryConfig {
            max_retries: 1,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
    }
}
