//! # Steadfast Infrastructure
//!
//! The resilient outbound API client and everything that touches I/O.
//!
//! This crate contains:
//! - [`ResilientClient`](api::ResilientClient): breakers, retries, cache,
//!   bounded concurrency and offline buffering around HTTP calls
//! - The reqwest transport and the connectivity signal
//! - Configuration loading from files and `STEADFAST_*` variables
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Builds on the primitives in `steadfast-common`
//! - Depends on `steadfast-domain` for configuration and errors
//! - Contains all "impure" code (network, filesystem, environment)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use api::{
    AccessTokenProvider, ApiError, ApiErrorCategory, ApiResponse, RequestOptions, ResilientClient,
    ResilientClientBuilder, ResponseSource, StaticTokenProvider,
};
pub use errors::InfraError;
pub use http::{ConnectivityMonitor, HttpClient, HttpClientBuilder};
pub use observability::init_tracing;
