//! Isolated workspace execution for AgentWatch.
//!
//! A [`WorkspaceProvider`] allocates an execution root, runs commands in it
//! under [`ExecutionLimits`], and streams their output line by line for the
//! telemetry parser. Two backends ship with the crate:
//!
//! - [`LocalProvider`]: a directory on the host, no real isolation (development, tests)
//! - [`ContainerProvider`]: one container per workspace with every [`SecurityProfile`] flag applied

pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod local;
pub mod provider;
pub mod workspace;

pub use agentwatch_core::types::{
    Backend, CleanupPolicy, ExecutionLimits, MountSpec, SecurityProfile, SecurityProfileBuilder,
};
pub use config::WorkspaceConfig;
pub use container::ContainerProvider;
pub use error::SandboxError;
pub use executor::{ProcessRunner, ProcessSpec, RawOutput};
pub use local::LocalProvider;
pub use provider::{provider_for, ExecOptions, LineStream, WorkspaceProvider};
pub use workspace::{ExecuteResult, Workspace, LAUNCH_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
