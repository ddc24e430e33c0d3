//! Resource ceilings for a workspace.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Resource limits applied to every command in a workspace.
///
/// Immutable once built: every constructor validates, and deserialization
/// goes through the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LimitsSpec", into = "LimitsSpec")]
pub struct ExecutionLimits {
    cpu_millis: u32,
    memory_mb: u64,
    disk_mb: Option<u64>,
    network_enabled: bool,
    timeout_secs: u64,
}

/// Wire form of [`ExecutionLimits`], validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LimitsSpec {
    #[serde(default = "default_cpu_millis")]
    cpu_millis: u32,

    #[serde(default = "default_memory_mb")]
    memory_mb: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    disk_mb: Option<u64>,

    #[serde(default)]
    network_enabled: bool,

    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_cpu_millis() -> u32 {
    1000 // one CPU
}

fn default_memory_mb() -> u64 {
    2048
}

fn default_timeout_secs() -> u64 {
    300 // 5 minutes
}

impl TryFrom<LimitsSpec> for ExecutionLimits {
    type Error = ConfigError;

    fn try_from(spec: LimitsSpec) -> Result<Self, Self::Error> {
        let limits = Self {
            cpu_millis: spec.cpu_millis,
            memory_mb: spec.memory_mb,
            disk_mb: spec.disk_mb,
            network_enabled: spec.network_enabled,
            timeout_secs: spec.timeout_secs,
        };
        limits.validate()?;
        Ok(limits)
    }
}

impl From<ExecutionLimits> for LimitsSpec {
    fn from(limits: ExecutionLimits) -> Self {
        Self {
            cpu_millis: limits.cpu_millis,
            memory_mb: limits.memory_mb,
            disk_mb: limits.disk_mb,
            network_enabled: limits.network_enabled,
            timeout_secs: limits.timeout_secs,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            cpu_millis: default_cpu_millis(),
            memory_mb: default_memory_mb(),
            disk_mb: None,
            network_enabled: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExecutionLimits {
    /// Create validated limits.
    ///
    /// `cpu_millis` is in thousandths of a CPU (1000 = one core).
    pub fn new(cpu_millis: u32, memory_mb: u64, timeout_secs: u64) -> Result<Self, ConfigError> {
        let limits = Self {
            cpu_millis,
            memory_mb,
            timeout_secs,
            ..Default::default()
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Create minimal (restrictive) limits.
    pub fn minimal() -> Self {
        Self {
            cpu_millis: 500,
            memory_mb: 256,
            disk_mb: Some(512),
            network_enabled: false,
            timeout_secs: 30,
        }
    }

    /// Set a disk ceiling.
    pub fn with_disk(mut self, disk_mb: u64) -> Result<Self, ConfigError> {
        self.disk_mb = Some(disk_mb);
        self.validate()?;
        Ok(self)
    }

    /// Enable or disable network access.
    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    /// Replace the wall-clock timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self, ConfigError> {
        self.timeout_secs = timeout_secs;
        self.validate()?;
        Ok(self)
    }

    /// Check every ceiling is a positive integer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.cpu_millis == 0 {
            errors.push("cpu_millis must be greater than 0");
        }
        if self.memory_mb == 0 {
            errors.push("memory_mb must be greater than 0");
        }
        if self.disk_mb == Some(0) {
            errors.push("disk_mb must be greater than 0 when set");
        }
        if self.timeout_secs == 0 {
            errors.push("timeout_secs must be greater than 0");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    pub fn cpu_millis(&self) -> u32 {
        self.cpu_millis
    }

    /// CPU quota as a decimal core count (`1.5` for 1500 millis).
    pub fn cpus(&self) -> String {
        let whole = self.cpu_millis / 1000;
        let frac = self.cpu_millis % 1000;
        if frac == 0 {
            whole.to_string()
        } else {
            format!("{}.{:03}", whole, frac)
                .trim_end_matches('0')
                .to_string()
        }
    }

    pub fn memory_mb(&self) -> u64 {
        self.memory_mb
    }

    pub fn disk_mb(&self) -> Option<u64> {
        self.disk_mb
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}
