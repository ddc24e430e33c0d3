//! Observability pipeline for AgentWatch.
//!
//! This crate turns a running agent's line stream into typed events and
//! gets them to a backend:
//!
//! - [`EventStreamParser`]: line-oriented state machine producing
//!   [`ObservabilityEvent`]s and a [`SessionSummary`]
//! - [`SessionOutputStream`]: one-pass tee over a line source with replay
//! - [`EventBuffer`] / [`HookClient`]: batching, overflow protection and bounded retries
//! - [`EventSink`]: file, HTTP and in-memory delivery targets
//! - [`Decision`] and [`ValidatorRegistry`]: fail-open hook decisions
//!
//! [`ObservabilityEvent`]: agentwatch_core::ObservabilityEvent
//! [`SessionSummary`]: agentwatch_core::SessionSummary

pub mod buffer;
pub mod client;
pub mod decision;
pub mod error;
pub mod parser;
pub mod sink;
pub mod stream;
pub mod validator;

pub use buffer::{BufferConfig, BufferStats, EventBuffer};
pub use client::{ClientConfig, HookClient, RetryPolicy};
pub use decision::Decision;
pub use error::{DeliveryError, TelemetryError};
pub use parser::EventStreamParser;
pub use sink::{sink_from_settings, EventSink, FileSink, HttpSink, MemorySink, NullSink};
pub use stream::SessionOutputStream;
pub use validator::{
    CommandBlocklist, PathScope, ValidationContext, ValidationError, Validator, ValidatorRegistry,
};

/// Result type for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
