//! Security profile definitions.

use serde::{Deserialize, Serialize};

/// Hardening flags applied to an isolated workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityProfile {
    /// Profile name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Drop all Linux capabilities.
    #[serde(default = "default_true")]
    pub drop_capabilities: bool,

    /// Forbid privilege escalation.
    #[serde(default = "default_true")]
    pub no_new_privileges: bool,

    /// Mount the root filesystem read-only.
    #[serde(default = "default_true")]
    pub read_only_root: bool,

    /// Writable scratch mount at `/tmp`.
    #[serde(default = "default_true")]
    pub tmpfs_tmp: bool,

    /// Writable scratch mount at the user home.
    #[serde(default = "default_true")]
    pub tmpfs_home: bool,

    /// Process-count ceiling.
    #[serde(default = "default_pids_limit", skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<u32>,

    /// Use the hardened runtime. `None` means detect at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardened_runtime: Option<bool>,
}

fn default_name() -> String {
    "custom".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pids_limit() -> Option<u32> {
    Some(256)
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self::production()
    }
}

impl SecurityProfile {
    /// Every hardening flag on, hardened runtime auto-detected.
    pub fn production() -> Self {
        Self {
            name: "production".to_string(),
            drop_capabilities: true,
            no_new_privileges: true,
            read_only_root: true,
            tmpfs_tmp: true,
            tmpfs_home: true,
            pids_limit: default_pids_limit(),
            hardened_runtime: None,
        }
    }

    /// Writable root and no hardened runtime, for local iteration.
    pub fn development() -> Self {
        Self {
            name: "development".to_string(),
            read_only_root: false,
            hardened_runtime: Some(false),
            ..Self::production()
        }
    }

    /// Start building a custom profile from the production baseline.
    pub fn builder(name: impl Into<String>) -> SecurityProfileBuilder {
        SecurityProfileBuilder::new(name)
    }
}

/// Builder for custom security profiles.
#[derive(Debug, Clone)]
pub struct SecurityProfileBuilder {
    profile: SecurityProfile,
}

impl SecurityProfileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            profile: SecurityProfile {
                name: name.into(),
                ..SecurityProfile::production()
            },
        }
    }

    pub fn drop_capabilities(mut self, enabled: bool) -> Self {
        self.profile.drop_capabilities = enabled;
        self
    }

    pub fn no_new_privileges(mut self, enabled: bool) -> Self {
        self.profile.no_new_privileges = enabled;
        self
    }

    pub fn read_only_root(mut self, enabled: bool) -> Self {
        self.profile.read_only_root = enabled;
        self
    }

    pub fn tmpfs_tmp(mut self, enabled: bool) -> Self {
        self.profile.tmpfs_tmp = enabled;
        self
    }

    pub fn tmpfs_home(mut self, enabled: bool) -> Self {
        self.profile.tmpfs_home = enabled;
        self
    }

    pub fn pids_limit(mut self, limit: Option<u32>) -> Self {
        self.profile.pids_limit = limit;
        self
    }

    pub fn hardened_runtime(mut self, enabled: Option<bool>) -> Self {
        self.profile.hardened_runtime = enabled;
        self
    }

    pub fn build(self) -> SecurityProfile {
        self.profile
    }
}

/// A named preset or an inline profile, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecuritySetting {
    Preset(SecurityPreset),
    Profile(SecurityProfile),
}

/// Built-in profile names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityPreset {
    Production,
    Development,
}

impl Default for SecuritySetting {
    fn default() -> Self {
        Self::Preset(SecurityPreset::Production)
    }
}

impl SecuritySetting {
    /// Resolve to a concrete profile.
    pub fn resolve(&self) -> SecurityProfile {
        match self {
            Self::Preset(SecurityPreset::Production) => SecurityProfile::production(),
            Self::Preset(SecurityPreset::Development) => SecurityProfile::development(),
            Self::Profile(profile) => profile.clone(),
        }
    }
}
