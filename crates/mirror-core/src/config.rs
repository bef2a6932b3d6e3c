//! Mirror configuration: TOML file, then `MIRROR_*` environment overrides.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_archive_procedure() -> String {
    "GetArchiveData".to_string()
}

const fn default_channel_capacity() -> usize {
    1
}

const fn default_page_size() -> usize {
    10
}

const fn default_initial_load_size() -> usize {
    10
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by the executor, the paging layer and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Remote connection URI.
    #[serde(default)]
    pub connection_target: String,

    /// Stored procedure that returns the archive for a device and range.
    #[serde(default = "default_archive_procedure")]
    pub archive_procedure: String,

    /// Batches buffered between a session and its consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_initial_load_size")]
    pub initial_load_size: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            connection_target: String::new(),
            archive_procedure: default_archive_procedure(),
            channel_capacity: default_channel_capacity(),
            page_size: default_page_size(),
            initial_load_size: default_initial_load_size(),
        }
    }
}

impl MirrorConfig {
    /// Create a configuration for a connection target with default settings.
    #[must_use]
    pub fn new(connection_target: impl Into<String>) -> Self {
        Self {
            connection_target: connection_target.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Environment overrides are applied separately via `apply_env_overrides()`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MIRROR_*` environment overrides.
    ///
    /// # Errors
    /// Returns error if a numeric override does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, slot) in [
            ("MIRROR_CONNECTION_TARGET", &mut self.connection_target),
            ("MIRROR_ARCHIVE_PROCEDURE", &mut self.archive_procedure),
        ] {
            if let Some(value) = lookup(key) {
                tracing::debug!(key, "config override applied");
                *slot = value;
            }
        }
        for (key, slot) in [
            ("MIRROR_CHANNEL_CAPACITY", &mut self.channel_capacity),
            ("MIRROR_PAGE_SIZE", &mut self.page_size),
            ("MIRROR_INITIAL_LOAD_SIZE", &mut self.initial_load_size),
        ] {
            if let Some(value) = lookup(key) {
                *slot = value.trim().parse().map_err(|_| {
                    tracing::warn!(key, %value, "config override is not a number");
                    ConfigError::InvalidEnv { key, value }
                })?;
                tracing::debug!(key, value = *slot, "config override applied");
            }
        }
        Ok(())
    }

    /// Validate configuration settings.
    ///
    /// # Errors
    /// Returns error describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.check();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "invalid configuration");
        }
        result
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.connection_target.trim().is_empty() {
            return Err(ConfigError::Invalid("connection_target cannot be empty".into()));
        }
        if self.archive_procedure.trim().is_empty() {
            return Err(ConfigError::Invalid("archive_procedure cannot be empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.initial_load_size == 0 {
            return Err(ConfigError::Invalid(
                "initial_load_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
