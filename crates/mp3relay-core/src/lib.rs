//! mp3relay-core: shared error type and configuration.
//!
//! This crate is the foundational dependency of the relay server, providing
//! the unified error taxonomy (with its HTTP status mapping) and the
//! immutable application configuration built once at startup.

pub mod config;
pub mod error;

// Re-export the most commonly used items at the crate root.
pub use config::{Config, Credential, UpstreamContract};
pub use error::{Error, Result};
