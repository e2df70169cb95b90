//! HTTP transport and connectivity signal

pub mod client;
pub mod connectivity;

pub use client::{HttpClient, HttpClientBuilder};
pub use connectivity::ConnectivityMonitor;
