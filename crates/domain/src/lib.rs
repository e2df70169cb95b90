//! # Steadfast Domain
//!
//! Plain data shared by every Steadfast crate.
//!
//! This crate contains:
//! - Client configuration structures and their validation
//! - Domain error types and Result definitions
//! - Default values for every recognised option
//!
//! ## Architecture
//! - No dependencies on other Steadfast crates
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
