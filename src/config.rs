//! Runner configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::protocol::codec::MAX_FRAME_BYTES;
use crate::{AppError, Result};

fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}

fn default_shutdown_timeout_seconds() -> u64 {
    10
}

fn default_ipc_name() -> String {
    "peerlink".into()
}

/// Configuration for one [`Runner`](crate::runner::Runner), parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Label used in logs and task spans; empty means `runner`.
    #[serde(default)]
    pub name: String,
    /// Longest inbound frame accepted, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// How long the exit handshake waits for the peer.
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
    /// Local socket name used by the `peerlink` binaries.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_frame_bytes: default_max_frame_bytes(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
            ipc_name: default_ipc_name(),
        }
    }
}

impl RunnerConfig {
    /// Default configuration with `name` as the log label.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "max_frame_bytes must be greater than zero".into(),
            ));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        Ok(())
    }

    /// Log label; `runner` when no name is configured.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            "runner"
        } else {
            &self.name
        }
    }

    /// [`shutdown_timeout_seconds`](Self::shutdown_timeout_seconds) as a duration.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}
