//! Resilient outbound API client
//!
//! This module provides the caller-facing HTTP client. It handles
//! authentication headers, per-endpoint circuit breaking, retries with
//! backoff, response caching, bounded concurrency and offline buffering.
//!
//! # Architecture
//!
//! - Transport through [`HttpClient`](crate::http::HttpClient) (one attempt per send)
//! - Breakers, cache and queues from `steadfast-common`
//! - Connectivity from [`ConnectivityMonitor`](crate::http::ConnectivityMonitor)
//! - Timeout on every network attempt

pub mod auth;
pub mod client;
pub mod errors;
pub mod request;

pub use auth::{AccessTokenProvider, StaticTokenProvider};
pub use client::{ResilientClient, ResilientClientBuilder};
pub use errors::{ApiError, ApiErrorCategory, Headers};
pub use request::{ApiRequest, ApiResponse, Fallback, RequestOptions, ResponseSource};
