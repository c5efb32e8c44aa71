//! Systemd backend implementation.
//!
//! This backend uses systemctl to manage services.
//! It's designed for Linux hosts running systemd.

use crate::error::{ConvergeError, Result};
use crate::service::backend::{
    ServiceAction, ServiceBackend, ServiceOperationResult, ServiceState, ServiceStatus,
    ServiceUnit,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Systemd backend for service operations.
///
/// Every systemctl invocation is bounded by the configured timeout.
pub struct SystemdBackend {
    /// Program and leading arguments invoked as systemctl.
    systemctl: Vec<String>,
    /// Directory unit files are written to on registration.
    unit_dir: PathBuf,
    /// Per-command timeout.
    timeout: Duration,
}

impl SystemdBackend {
    /// Creates a new systemd backend.
    pub fn new(unit_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            systemctl: vec!["systemctl".to_string()],
            unit_dir: unit_dir.into(),
            timeout,
        }
    }

    /// Replaces the systemctl command line, e.g. with a stand-in script.
    #[cfg(test)]
    fn with_systemctl(mut self, command: &[&str]) -> Self {
        self.systemctl = command.iter().map(|arg| arg.to_string()).collect();
        self
    }

    /// Path of the unit file for a service.
    pub fn unit_path(&self, service: &str) -> PathBuf {
        self.unit_dir.join(format!("{}.service", service))
    }

    /// Executes a systemctl command and returns the result.
    async fn systemctl(&self, args: &[&str]) -> Result<(bool, String)> {
        debug!(args = ?args, "Executing systemctl");

        let (program, leading) = self
            .systemctl
            .split_first()
            .ok_or_else(|| ConvergeError::backend("systemctl command is empty"))?;

        let child = Command::new(program)
            .args(leading)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, child)
            .await
            .map_err(|_| ConvergeError::Timeout {
                operation: format!("systemctl {}", args.join(" ")),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                ConvergeError::backend_with_source(format!("Failed to execute systemctl: {}", e), e)
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n{}", stdout, stderr)
        };

        debug!(
            exit_code = output.status.code(),
            stdout = %stdout,
            stderr = %stderr,
            "systemctl completed"
        );

        Ok((output.status.success(), combined_output))
    }

    /// Gets the current state of a registered service.
    ///
    /// `is-active` exits non-zero for every state but active, so only the
    /// printed state is trusted.
    async fn get_service_state(&self, service: &str) -> Result<ServiceState> {
        let (_, output) = self.systemctl(&["is-active", service]).await?;

        match output.lines().next().map(str::trim) {
            Some("active" | "activating" | "reloading") => Ok(ServiceState::Running),
            Some("inactive" | "deactivating") => Ok(ServiceState::Stopped),
            Some("failed") => Ok(ServiceState::Failed),
            _ => Err(ConvergeError::backend(format!(
                "Failed to query state of {}: {}",
                service,
                output.trim()
            ))),
        }
    }

    async fn require_service(&self, service: &str) -> Result<()> {
        if !self.exists(service).await? {
            return Err(ConvergeError::ServiceNotFound {
                service: service.to_string(),
            });
        }
        Ok(())
    }

    /// Kills every process of a service whose stop timed out.
    async fn force_stop(&self, service: &str, cause: ConvergeError) -> Result<ServiceState> {
        warn!(service = service, error = %cause, "Stop timed out, sending SIGKILL");

        let (success, output) = self
            .systemctl(&["kill", "--signal=SIGKILL", service])
            .await?;
        if !success {
            error!(service = service, output = %output, "Failed to kill service");
            return Err(cause);
        }

        let state = self.get_service_state(service).await?;
        if state.is_running() {
            return Err(cause);
        }
        Ok(state)
    }
}

/// Renders a systemd unit file.
pub fn render_unit(unit: &ServiceUnit) -> String {
    let user_line = unit
        .user
        .as_ref()
        .map(|user| format!("User={}\n", user))
        .unwrap_or_default();

    format!(
        "[Unit]
Description={description}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
WorkingDirectory={working_dir}
ExecStart={exec_start}
ExecStop={exec_stop}
{user_line}Restart=on-failure

[Install]
WantedBy=multi-user.target
",
        description = unit.description,
        working_dir = unit.working_dir.display(),
        exec_start = unit.exec_start,
        exec_stop = unit.exec_stop,
    )
}

async fn write_unit_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await.map_err(|e| {
        ConvergeError::backend_with_source(
            format!("Failed to write unit file {}", path.display()),
            e,
        )
    })
}

#[async_trait]
impl ServiceBackend for SystemdBackend {
    fn name(&self) -> &'static str {
        "systemd"
    }

    async fn exists(&self, service: &str) -> Result<bool> {
        let (success, output) = self
            .systemctl(&["show", "--property=LoadState", service])
            .await?;

        let load_state = output
            .lines()
            .find_map(|line| line.trim().strip_prefix("LoadState="));

        match load_state {
            Some(state) => Ok(state != "not-found"),
            None => Err(ConvergeError::backend(format!(
                "Failed to query {} (systemctl {}): {}",
                service,
                if success { "succeeded" } else { "failed" },
                output.trim()
            ))),
        }
    }

    async fn status(&self, service: &str) -> Result<ServiceStatus> {
        if !self.exists(service).await? {
            return Ok(ServiceStatus::absent(service));
        }

        let state = self.get_service_state(service).await?;
        Ok(ServiceStatus::new(service, state))
    }

    async fn start(&self, service: &str) -> Result<ServiceOperationResult> {
        self.require_service(service).await?;

        info!(service = service, "Starting service via systemd");

        let (success, output) = self.systemctl(&["start", service]).await?;

        if !success {
            error!(
                service = service,
                output = %output,
                "Failed to start service"
            );
            return Ok(ServiceOperationResult::failure(
                service,
                ServiceAction::Start,
                ServiceState::Failed,
                output,
            ));
        }

        // Verify the service started
        let new_state = self.get_service_state(service).await?;

        if new_state.is_running() {
            info!(service = service, "Service started successfully");
            Ok(ServiceOperationResult::success(
                service,
                ServiceAction::Start,
                ServiceState::Running,
            ))
        } else {
            warn!(
                service = service,
                state = %new_state,
                "Service did not reach running state after start"
            );
            Ok(ServiceOperationResult::failure(
                service,
                ServiceAction::Start,
                new_state,
                "Service did not start properly",
            ))
        }
    }

    async fn stop(&self, service: &str) -> Result<ServiceOperationResult> {
        self.require_service(service).await?;

        info!(service = service, "Stopping service via systemd");

        let (success, output) = match self.systemctl(&["stop", service]).await {
            Err(cause @ ConvergeError::Timeout { .. }) => {
                let state = self.force_stop(service, cause).await?;
                return Ok(ServiceOperationResult {
                    message: Some("killed after stop timed out".to_string()),
                    ..ServiceOperationResult::success(service, ServiceAction::Stop, state)
                });
            }
            other => other?,
        };

        if !success {
            error!(
                service = service,
                output = %output,
                "Failed to stop service"
            );
            return Ok(ServiceOperationResult::failure(
                service,
                ServiceAction::Stop,
                ServiceState::Failed,
                output,
            ));
        }

        // Verify the service stopped
        let new_state = self.get_service_state(service).await?;

        if !new_state.is_running() {
            info!(service = service, "Service stopped successfully");
            Ok(ServiceOperationResult::success(
                service,
                ServiceAction::Stop,
                new_state,
            ))
        } else {
            warn!(
                service = service,
                state = %new_state,
                "Service did not reach stopped state after stop"
            );
            Ok(ServiceOperationResult::failure(
                service,
                ServiceAction::Stop,
                new_state,
                "Service did not stop properly",
            ))
        }
    }

    async fn register(&self, unit: &ServiceUnit) -> Result<ServiceOperationResult> {
        let path = self.unit_path(&unit.name);
        info!(service = %unit.name, unit_file = %path.display(), "Registering service via systemd");

        write_unit_file(&path, &render_unit(unit)).await?;

        for args in [vec!["daemon-reload"], vec!["enable", unit.name.as_str()]] {
            let (success, output) = self.systemctl(&args).await?;
            if !success {
                error!(
                    service = %unit.name,
                    output = %output,
                    "Failed to register service"
                );
                return Ok(ServiceOperationResult::failure(
                    unit.name.as_str(),
                    ServiceAction::Register,
                    ServiceState::Stopped,
                    output,
                ));
            }
        }

        Ok(ServiceOperationResult::success(
            unit.name.as_str(),
            ServiceAction::Register,
            ServiceState::Stopped,
        ))
    }
}
