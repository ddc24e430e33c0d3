//! Telemetry error types.

use agentwatch_core::ConfigError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the telemetry pipeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A summary was requested before the stream was drained.
    #[error("Stream not yet consumed")]
    NotYetConsumed,

    /// Delivery to a sink failed.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid telemetry configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A sink write failed. Raised, never swallowed, so retries have something to retry.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    /// The sink's transport is not compiled in.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The backend answered with a non-success status.
    #[error("Rejected by backend with status {status}")]
    Rejected { status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The sink was closed.
    #[error("Sink is closed")]
    Closed,
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
