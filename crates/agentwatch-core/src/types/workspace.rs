//! Plain workspace configuration data shared by the config file and providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which isolation backend hosts a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A directory on the host.
    #[default]
    Local,
    /// A long-running container.
    Container,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Container => "container",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "container" | "docker" => Ok(Self::Container),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// A host directory exposed inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Host path.
    pub source: PathBuf,

    /// Path inside the workspace.
    pub target: PathBuf,

    #[serde(default)]
    pub read_only: bool,
}

impl MountSpec {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// When a workspace is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPolicy {
    /// Destroy the workspace when its owner is done with it.
    #[serde(default = "default_true")]
    pub auto_remove: bool,

    /// Keep a workspace whose commands failed, for inspection.
    #[serde(default)]
    pub keep_on_error: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            auto_remove: true,
            keep_on_error: false,
        }
    }
}

impl CleanupPolicy {
    /// Never remove automatically.
    pub fn keep() -> Self {
        Self {
            auto_remove: false,
            keep_on_error: true,
        }
    }

    /// Whether a workspace should be destroyed given its error state.
    pub fn should_remove(&self, errored: bool) -> bool {
        self.auto_remove && !(errored && self.keep_on_error)
    }
}
