//! State reader - observes the agent as it currently is.

use crate::config::{Presence, RunState};
use crate::error::{ConvergeError, Result};
use crate::install::InstallLayout;
use crate::service::{ServiceController, ServiceState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Snapshot of the agent on this host. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActualState {
    /// Present iff a service registration exists.
    pub presence: Presence,
    /// Started iff the service is registered and running.
    pub run_state: RunState,
    /// State reported by the service manager.
    pub service: ServiceState,
    /// Whether the installation marker file exists.
    pub files_present: bool,
    pub observed_at: DateTime<Utc>,
}

impl ActualState {
    /// Derives presence and run state from the two checks.
    pub fn observe(service: ServiceState, files_present: bool) -> Self {
        let presence = if service.is_registered() {
            Presence::Present
        } else {
            Presence::Absent
        };
        let run_state = if service.is_running() {
            RunState::Started
        } else {
            RunState::Stopped
        };

        Self {
            presence,
            run_state,
            service,
            files_present,
            observed_at: Utc::now(),
        }
    }
}

/// Reads the actual state. Has no side effects.
#[derive(Clone)]
pub struct StateReader {
    controller: ServiceController,
    layout: InstallLayout,
}

impl StateReader {
    pub fn new(controller: ServiceController, layout: InstallLayout) -> Self {
        Self { controller, layout }
    }

    /// Observes the agent named `name` installed under `install_dir`.
    ///
    /// A missing installation or service is a state, not an error.
    pub async fn read(&self, name: &str, install_dir: &Path) -> Result<ActualState> {
        if name.trim().is_empty() {
            return Err(ConvergeError::validation("agent name must not be empty"));
        }

        let marker = self.layout.marker_path(install_dir);
        let files_present = tokio::fs::try_exists(&marker).await?;
        let service = self.controller.query(name).await?;

        let actual = ActualState::observe(service, files_present);

        if files_present != service.is_registered() {
            warn!(
                agent = name,
                marker = %marker.display(),
                files_present,
                service = %service,
                "Installed files and service registration disagree"
            );
        }

        debug!(
            agent = name,
            presence = %actual.presence,
            run_state = %actual.run_state,
            "Read actual state"
        );

        Ok(actual)
    }
}
