//! Configuration module for agent-converge.
//!
//! This module provides all configuration types and loading functionality.
//! Configuration is loaded from a YAML file and can be overridden by
//! environment variables.

mod desired;
mod logging;
mod service;
mod timeout;

pub use desired::{
    DesiredState, Presence, RunState, DEFAULT_CONTROLLER_PORT, DEFAULT_INSTALL_DIR,
    DEFAULT_SERVICE_PORT,
};
pub use logging::{LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use service::{Backend, ServiceConfig, ServiceDefinition, DEFAULT_UNIT_DIR};
pub use timeout::TimeoutConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ConvergeError, Result};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/agent-converge/config.yaml";

/// Environment variable for configuration file path.
pub const ENV_CONFIG_PATH: &str = "AGENT_CONVERGE_CONFIG";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Desired state of the managed agent.
    pub agent: DesiredState,

    /// Service manager configuration.
    pub service: ServiceConfig,

    /// Timeout configuration.
    pub timeout: TimeoutConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Service definitions (for exec backend).
    #[serde(default)]
    pub services: HashMap<String, ServiceDefinition>,
}

impl Config {
    /// Loads configuration with the following priority:
    /// 1. Explicit path (if provided)
    /// 2. AGENT_CONVERGE_CONFIG environment variable
    /// 3. Default path (/etc/agent-converge/config.yaml)
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path);

        if !path.exists() {
            return Err(ConvergeError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let mut config = Self::parse_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConvergeError::config_with_source("Failed to parse config", e))?;

        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvergeError::config_with_source(
                format!("Failed to read config file: {}", path.display()),
                e,
            )
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            ConvergeError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })
    }

    /// Resolves the configuration file path based on priority.
    fn resolve_config_path(explicit_path: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit_path {
            return path.to_path_buf();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_PATH) {
            return PathBuf::from(env_path);
        }

        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Applies overrides looked up by variable name. Unparseable values are
    /// ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("AGENT_CONVERGE_LOG_LEVEL") {
            if let Ok(level) = level.parse() {
                self.logging.level = level;
            }
        }
        if let Some(format) = lookup("AGENT_CONVERGE_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.logging.format = format;
            }
        }
        if let Some(output) = lookup("AGENT_CONVERGE_LOG_OUTPUT") {
            if let Ok(output) = output.parse() {
                self.logging.output = output;
            }
        }
        if let Some(backend) = lookup("AGENT_CONVERGE_BACKEND") {
            if let Ok(backend) = backend.parse() {
                self.service.backend = backend;
            }
        }
    }

    /// Validates configuration.
    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;

        if self.timeout.service_seconds == 0 {
            return Err(ConvergeError::config("timeout.service_seconds must be > 0"));
        }
        if self.timeout.download_seconds == 0 {
            return Err(ConvergeError::config(
                "timeout.download_seconds must be > 0",
            ));
        }

        // The exec backend can only manage services it has commands for
        if self.service.backend == Backend::Exec && !self.services.contains_key(&self.agent.name)
        {
            return Err(ConvergeError::config(format!(
                "Backend is 'exec' but services.{} is not defined",
                self.agent.name
            )));
        }

        for (name, def) in &self.services {
            if def.start.is_empty() {
                return Err(ConvergeError::config(format!(
                    "services.{}.start is required",
                    name
                )));
            }
            if def.stop.is_empty() {
                return Err(ConvergeError::config(format!(
                    "services.{}.stop is required",
                    name
                )));
            }
            if def.status.is_empty() {
                return Err(ConvergeError::config(format!(
                    "services.{}.status is required",
                    name
                )));
            }
        }

        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(ConvergeError::config(
                "logging.file_path is required when output is file",
            ));
        }

        Ok(())
    }
}
