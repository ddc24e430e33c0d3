//! Sandbox error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by workspace providers.
///
/// Command failures are never reported here; they are captured into
/// [`ExecuteResult`](crate::ExecuteResult) so callers always get a result.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The workspace could not be created (backend unavailable, bad mount).
    #[error("Workspace creation failed: {0}")]
    WorkspaceCreation(String),

    /// A file read targeted a path that does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A path resolved outside the workspace root.
    #[error("Path escapes workspace root: {0}")]
    PathEscape(PathBuf),

    /// Invalid resource limits or workspace configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend rejected an operation.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl SandboxError {
    /// Create a new workspace creation error.
    pub fn creation(msg: impl Into<String>) -> Self {
        Self::WorkspaceCreation(msg.into())
    }

    /// Create a new backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<agentwatch_core::ConfigError> for SandboxError {
    fn from(err: agentwatch_core::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
