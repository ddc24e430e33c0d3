//! Configuration loading and persistence.

use super::{Config, SinkSettings};
use crate::error::ConfigError;
use crate::paths;
use crate::types::Backend;
use std::fs;
use std::path::Path;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::load_default() {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // Workspace
        if let Err(ConfigError::Validation(msg)) = self.workspace.limits.validate() {
            errors.push(format!("workspace.limits: {}", msg));
        }
        if self.workspace.backend == Backend::Container {
            let image = self.workspace.image.as_deref().unwrap_or("").trim();
            if image.is_empty() {
                errors.push("Container backend requires workspace.image".to_string());
            }
        }
        if !self.workspace.working_dir.is_absolute() {
            errors.push(format!(
                "workspace.working_dir must be absolute, got {}",
                self.workspace.working_dir.display()
            ));
        }
        for (i, mount) in self.workspace.mounts.iter().enumerate() {
            if !mount.target.is_absolute() {
                errors.push(format!(
                    "workspace.mounts[{}]: target must be absolute, got {}",
                    i,
                    mount.target.display()
                ));
            }
        }

        // Telemetry
        let telemetry = &self.telemetry;
        if telemetry.batch_size == 0 {
            errors.push("telemetry.batch_size must be greater than 0".to_string());
        }
        if !(telemetry.flush_interval_secs.is_finite() && telemetry.flush_interval_secs > 0.0) {
            errors.push(format!(
                "telemetry.flush_interval_secs must be a positive number, got {}",
                telemetry.flush_interval_secs
            ));
        }
        if telemetry.max_buffer_size < telemetry.batch_size {
            errors.push(format!(
                "telemetry.max_buffer_size ({}) must be at least batch_size ({})",
                telemetry.max_buffer_size, telemetry.batch_size
            ));
        }
        if telemetry.max_retry_attempts == 0 {
            errors.push("telemetry.max_retry_attempts must be at least 1".to_string());
        }
        if let SinkSettings::Http { endpoint, timeout_secs } = &telemetry.sink {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(format!(
                    "telemetry.sink.endpoint must be an http(s) URL, got '{}'",
                    endpoint
                ));
            }
            if *timeout_secs == 0 {
                errors.push("telemetry.sink.timeout_secs must be greater than 0".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

/// Configuration builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the workspace backend.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.workspace.backend = backend;
        self
    }

    /// Set the container image.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.workspace.image = Some(image.into());
        self
    }

    /// Set the telemetry batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.telemetry.batch_size = size;
        self
    }

    /// Set the telemetry sink.
    pub fn sink(mut self, sink: SinkSettings) -> Self {
        self.config.telemetry.sink = sink;
        self
    }

    /// Build the config.
    pub fn build(self) -> Config {
        self.config
    }
}
