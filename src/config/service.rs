//! Service manager configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConvergeError;

/// Default directory systemd unit files are written to.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Service manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service control backend.
    pub backend: Backend,

    /// Register the agent as an OS service after installing it.
    pub register: bool,

    /// Where systemd unit files are written.
    pub unit_dir: PathBuf,

    /// Account the service runs as (systemd `User=`).
    pub user: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Systemd,
            register: true,
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            user: None,
        }
    }
}

/// Service control backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// systemd backend.
    #[default]
    Systemd,

    /// Command execution backend.
    Exec,
}

impl FromStr for Backend {
    type Err = ConvergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "systemd" => Ok(Backend::Systemd),
            "exec" => Ok(Backend::Exec),
            _ => Err(ConvergeError::config(format!("Unknown backend: {}", s))),
        }
    }
}

/// Service definition for the exec backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefinition {
    /// Start command.
    pub start: String,

    /// Stop command.
    pub stop: String,

    /// Status check command. Exit code 0 means running.
    pub status: String,

    /// Registration check command. Exit code 0 means registered.
    /// Without it, a defined service counts as registered.
    pub exists: Option<String>,

    /// Registration command, run after a fresh install.
    pub register: Option<String>,

    /// Working directory.
    pub working_dir: Option<String>,

    /// Environment variables.
    pub env: Vec<String>,

    /// Command timeout in seconds.
    pub timeout: Option<u64>,
}
