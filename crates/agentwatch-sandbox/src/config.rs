//! Per-workspace configuration.

use crate::error::SandboxError;
use crate::Result;
use agentwatch_core::config::WorkspaceSettings;
use agentwatch_core::types::{Backend, CleanupPolicy, ExecutionLimits, MountSpec, SecurityProfile};
use agentwatch_core::SecretString;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Everything a provider needs to build one workspace.
///
/// Secret values are held as [`SecretString`] and never appear in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub backend: Backend,

    /// Container image (container backend only).
    pub image: Option<String>,

    /// Working directory inside the workspace.
    pub working_dir: PathBuf,

    pub limits: ExecutionLimits,

    pub security: SecurityProfile,

    pub cleanup: CleanupPolicy,

    mounts: Vec<MountSpec>,
    secrets: BTreeMap<String, SecretString>,
    env: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            image: None,
            working_dir: PathBuf::from("/workspace"),
            limits: ExecutionLimits::default(),
            security: SecurityProfile::production(),
            cleanup: CleanupPolicy::default(),
            mounts: Vec::new(),
            secrets: BTreeMap::new(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl WorkspaceConfig {
    /// Create a config for `backend` with default limits and the production profile.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Build from the `workspace` section of the config file.
    pub fn from_settings(settings: &WorkspaceSettings) -> Self {
        let mut config = Self {
            backend: settings.backend,
            image: settings.image.clone(),
            working_dir: settings.working_dir.clone(),
            limits: settings.limits.clone(),
            security: settings.security.resolve(),
            cleanup: settings.cleanup,
            ..Default::default()
        };
        for mount in &settings.mounts {
            config = config.with_mount(mount.clone());
        }
        for (key, value) in &settings.env {
            config = config.with_env(key, value);
        }
        for (key, value) in &settings.labels {
            config = config.with_label(key, value);
        }
        config
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_security(mut self, profile: SecurityProfile) -> Self {
        self.security = profile;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Add a mount. A later mount with the same target replaces an earlier one.
    pub fn with_mount(mut self, mount: MountSpec) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Set a secret environment variable.
    ///
    /// Replacing an existing secret is allowed but logged (by key only).
    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<SecretString>) -> Self {
        let key = key.into();
        if self.secrets.insert(key.clone(), value.into()).is_some() {
            warn!(key = %key, "Replacing previously set workspace secret");
        }
        self
    }

    /// Set a plain environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Fill in environment defaults supplied by a plugin.
    ///
    /// Defaults become secrets, and never replace a key that is already set
    /// as a secret or a plain variable.
    pub fn resolve_plugin_env<I, K, V>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SecretString>,
    {
        for (key, value) in defaults {
            let key = key.into();
            if self.secrets.contains_key(&key) || self.env.contains_key(&key) {
                debug!(key = %key, "Keeping explicitly set value over plugin default");
                continue;
            }
            self.secrets.insert(key, value.into());
        }
        self
    }

    /// Mounts as added, duplicates included.
    pub fn mounts(&self) -> &[MountSpec] {
        &self.mounts
    }

    /// Mounts with duplicates removed: the last entry for a target wins and
    /// keeps its position.
    pub fn effective_mounts(&self) -> Vec<&MountSpec> {
        let mut seen = HashSet::new();
        let mut effective: Vec<&MountSpec> = self
            .mounts
            .iter()
            .rev()
            .filter(|m| seen.insert(m.target.clone()))
            .collect();
        effective.reverse();
        effective
    }

    pub fn secrets(&self) -> &BTreeMap<String, SecretString> {
        &self.secrets
    }

    pub fn secret(&self, key: &str) -> Option<&SecretString> {
        self.secrets.get(key)
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Check the config can be handed to its backend.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        if self.backend == Backend::Container
            && self.image.as_deref().map_or(true, |i| i.trim().is_empty())
        {
            return Err(SandboxError::InvalidConfig(
                "container backend requires an image".to_string(),
            ));
        }
        if !self.working_dir.is_absolute() {
            return Err(SandboxError::InvalidConfig(format!(
                "working_dir must be absolute, got {}",
                self.working_dir.display()
            )));
        }
        for key in self.env.keys().chain(self.secrets.keys()) {
            if key.is_empty() || key.contains('=') {
                return Err(SandboxError::InvalidConfig(format!(
                    "invalid environment variable name '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_plugin_defaults_never_override_secrets() {
        let defaults = HashMap::from([("K".to_string(), "plugin".to_string())]);
        let config = WorkspaceConfig::default()
            .with_secret("K", "v1")
            .resolve_plugin_env(defaults);
        assert!(config.secret("K").is_some_and(|s| s == "v1"));
    }

    #[test]
    fn test_plugin_defaults_fill_missing_keys() {
        let config = WorkspaceConfig::default()
            .with_env("PLAIN", "x")
            .resolve_plugin_env([("PLAIN", "y"), ("NEW", "z")]);
        assert_eq!(config.env().get("PLAIN").map(String::as_str), Some("x"));
        assert!(config.secret("PLAIN").is_none());
        assert!(config.secret("NEW").is_some_and(|s| s == "z"));
    }

    #[test]
    fn test_with_secret_replaces_explicitly() {
        let config = WorkspaceConfig::default()
            .with_secret("TOKEN", "a")
            .with_secret("TOKEN", "b");
        assert!(config.secret("TOKEN").is_some_and(|s| s == "b"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = WorkspaceConfig::default().with_secret("TOKEN", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_effective_mounts_last_wins() {
        let config = WorkspaceConfig::default()
            .with_mount(MountSpec::new("/a", "/workspace/data"))
            .with_mount(MountSpec::new("/b", "/workspace/src"))
            .with_mount(MountSpec::new("/c", "/workspace/data").read_only());

        assert_eq!(config.mounts().len(), 3);
        let effective = config.effective_mounts();
        assert_eq!(effective.len(), 2);
        assert_eq!(effective[0].source, PathBuf::from("/b"));
        assert_eq!(effective[1].source, PathBuf::from("/c"));
        assert!(effective[1].read_only);
    }

    #[test]
    fn test_validate() {
        assert!(WorkspaceConfig::default().validate().is_ok());
        assert!(WorkspaceConfig::new(Backend::Container).validate().is_err());
        assert!(WorkspaceConfig::new(Backend::Container)
            .with_image("alpine:3")
            .validate()
            .is_ok());
        assert!(WorkspaceConfig::default()
            .with_working_dir("relative")
            .validate()
            .is_err());
        assert!(WorkspaceConfig::default()
            .with_env("A=B", "x")
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_settings() {
        let settings = agentwatch_core::Config::parse(
            r#"{ workspace: { backend: "container", image: "img", security: "development",
                 env: { FOO: "bar" }, labels: { team: "infra" } } }"#,
        )
        .unwrap()
        .workspace;
        let config = WorkspaceConfig::from_settings(&settings);
        assert_eq!(config.backend, Backend::Container);
        assert_eq!(config.security, SecurityProfile::development());
        assert_eq!(config.env().get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(config.labels().get("team").map(String::as_str), Some("infra"));
    }
}
