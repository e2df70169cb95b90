//! Response caching with TTL expiration
//!
//! - [`ResponseCache`]: thread-safe TTL store, generic over the value and the
//!   [`Clock`](crate::resilience::Clock)
//! - [`request_signature`]: deterministic key from method, URL and query
//! - [`CacheStats`]: hit/miss/insert/expiration counters
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use steadfast_common::cache::{request_signature, ResponseCache};
//!
//! let cache: ResponseCache<String> = ResponseCache::new(Duration::from_secs(300));
//! let key = request_signature("GET", "https://api.example.com/courses", &[]);
//! cache.set(key.clone(), "[]".to_string());
//! assert_eq!(cache.get(&key).as_deref(), Some("[]"));
//! ```

pub mod core;
pub mod key;
pub mod stats;

pub use self::core::ResponseCache;
pub use self::key::request_signature;
pub use self::stats::CacheStats;
