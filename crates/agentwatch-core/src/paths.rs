//! Path resolution utilities.

use crate::env::{get_var, vars};
use crate::error::ConfigError;
use std::path::{Component, Path, PathBuf};

/// Get the AgentWatch base directory (`$AGENTWATCH_HOME` or `~/.agentwatch`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = get_var(vars::AGENTWATCH_HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".agentwatch"))
}

/// Get the main config file path (`$AGENTWATCH_CONFIG` or `~/.agentwatch/agentwatch.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_var(vars::AGENTWATCH_CONFIG) {
        return Ok(expand_tilde(&path));
    }
    Ok(base_dir()?.join("agentwatch.json5"))
}

/// Get the directory local workspaces are created under (`~/.agentwatch/workspaces`).
pub fn workspaces_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("workspaces"))
}

/// Get the default event log path (`~/.agentwatch/events/events.jsonl`).
pub fn events_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("events").join("events.jsonl"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Join a workspace-relative path onto `root` without touching the filesystem.
///
/// Leading `/` is stripped so absolute paths are interpreted relative to the
/// root. Returns `None` if `..` components would climb above the root.
pub fn join_within(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut depth = 0usize;
    for component in relative.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                joined.pop();
            }
            Component::Normal(part) => {
                depth += 1;
                joined.push(part);
            }
        }
    }
    Some(joined)
}
