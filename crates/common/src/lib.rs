//! Skewbot Common Utilities
//!
//! Shared infrastructure for all Skewbot crates:
//! - Error types and result aliases
//! - Per-caller request rate limiting
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;

pub use config::*;
pub use error::*;
pub use rate_limit::RateLimiter;
