//! Hook decisions.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Verdict a hook returns for a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block { reason: String },
}

impl Decision {
    pub fn allow() -> Self {
        Self::Allow
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Resolve a hook outcome, failing open.
    ///
    /// Any error becomes [`Decision::Allow`]. This is the only place a hook
    /// failure is turned into a decision.
    pub fn from_result<E: fmt::Display>(result: Result<Decision, E>) -> Self {
        match result {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Hook failed, allowing: {}", e);
                Self::Allow
            }
        }
    }
}

impl Default for Decision {
    fn default() -> Self {
        Self::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Block { reason } => write!(f, "block: {}", reason),
        }
    }
}
