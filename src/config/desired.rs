//! Desired state of the managed agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{ConvergeError, Result};

/// Default installation directory.
pub const DEFAULT_INSTALL_DIR: &str = "/opt/buildagent";

/// Default port the agent's own listener binds to.
pub const DEFAULT_SERVICE_PORT: u16 = 9090;

/// Default port of the controller the agent reports to.
pub const DEFAULT_CONTROLLER_PORT: u16 = 80;

/// Whether the agent should be installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Present => write!(f, "present"),
            Presence::Absent => write!(f, "absent"),
        }
    }
}

/// Whether the agent's service should be running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Started,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Started => write!(f, "started"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Caller-specified target configuration of the agent.
///
/// Every operation (read, plan, apply, compliance) consumes this same
/// struct, so the defaults below apply uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredState {
    /// Service and installation name. Also written as the agent's name.
    pub name: String,

    /// Installed or not.
    pub presence: Presence,

    /// Running or not.
    pub run_state: RunState,

    /// Where to fetch the installation bundle from. Required to install.
    pub bundle_url: Option<String>,

    /// Installation root.
    pub install_dir: PathBuf,

    /// Port the agent's own listener binds to.
    pub service_port: u16,

    /// Host of the controller the agent reports to. Required to install.
    pub controller_host: Option<String>,

    /// Port of the controller the agent reports to.
    pub controller_port: u16,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            name: String::new(),
            presence: Presence::Present,
            run_state: RunState::Started,
            bundle_url: None,
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            service_port: DEFAULT_SERVICE_PORT,
            controller_host: None,
            controller_port: DEFAULT_CONTROLLER_PORT,
        }
    }
}

impl DesiredState {
    /// Creates a desired state with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Rejects self-contradictory or malformed desired state.
    ///
    /// Runs before any observation or mutation.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConvergeError::validation("agent name must not be empty"));
        }

        if self.presence == Presence::Absent && self.run_state == RunState::Started {
            return Err(ConvergeError::validation(format!(
                "agent '{}' cannot be both absent and started",
                self.name
            )));
        }

        if self.service_port == 0 {
            return Err(ConvergeError::validation("service_port must be > 0"));
        }

        if self.controller_port == 0 {
            return Err(ConvergeError::validation("controller_port must be > 0"));
        }

        if self.install_dir.as_os_str().is_empty() {
            return Err(ConvergeError::validation("install_dir must not be empty"));
        }

        Ok(())
    }
}
