//! # agentwatch-core
//!
//! Core types, configuration, and utilities for AgentWatch.
//!
//! This crate provides shared functionality used across all AgentWatch crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the JSON5 config file
//! - **Types**: Observability events, session summaries, and hook events
//! - **Utilities**: Path resolution, ID generation, secrets, and environment handling

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use secret::SecretString;
pub use types::*;
