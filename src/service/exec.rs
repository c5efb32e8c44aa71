//! Exec backend implementation.
//!
//! This backend executes user-defined commands for service operations.
//! It's designed for environments where systemd is not available,
//! such as Docker containers.

use crate::config::ServiceDefinition;
use crate::error::{ConvergeError, Result};
use crate::service::backend::{
    ServiceAction, ServiceBackend, ServiceOperationResult, ServiceState, ServiceStatus,
    ServiceUnit,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Exec backend for service operations.
///
/// Each service must have start, stop, and status commands defined
/// in the configuration file. A service without a definition is
/// reported as absent.
pub struct ExecBackend {
    /// Service definitions from configuration.
    services: HashMap<String, ServiceDefinition>,
    /// Timeout for definitions that do not set their own.
    default_timeout: Duration,
}

impl ExecBackend {
    /// Creates a new exec backend with the given service definitions.
    pub fn new(services: HashMap<String, ServiceDefinition>, default_timeout: Duration) -> Self {
        Self {
            services,
            default_timeout,
        }
    }

    /// Gets the service definition for a registered service.
    async fn registered_service(&self, name: &str) -> Result<&ServiceDefinition> {
        match self.services.get(name) {
            Some(definition) if self.is_registered(name, definition).await? => Ok(definition),
            _ => Err(ConvergeError::ServiceNotFound {
                service: name.to_string(),
            }),
        }
    }

    async fn is_registered(&self, name: &str, definition: &ServiceDefinition) -> Result<bool> {
        match &definition.exists {
            Some(command) => {
                let (success, _) = self.execute_command(command, name, definition).await?;
                Ok(success)
            }
            None => Ok(true),
        }
    }

    /// Executes a command and returns the exit status and output.
    async fn execute_command(
        &self,
        command: &str,
        service_name: &str,
        definition: &ServiceDefinition,
    ) -> Result<(bool, String)> {
        debug!(
            service = service_name,
            command = command,
            "Executing command"
        );

        // Parse command into program and arguments using shell-style parsing
        let parts = shell_words::split(command).map_err(|e| {
            ConvergeError::backend(format!("Failed to parse command '{}': {}", command, e))
        })?;
        let Some((program, args)) = parts.split_first() else {
            return Err(ConvergeError::backend("Empty command"));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(working_dir) = &definition.working_dir {
            cmd.current_dir(working_dir);
        }

        for env_var in &definition.env {
            if let Some((key, value)) = env_var.split_once('=') {
                cmd.env(key, value);
            } else {
                warn!(
                    service = service_name,
                    env_var = env_var,
                    "Invalid environment variable format, expected KEY=VALUE"
                );
            }
        }

        let timeout_duration = definition
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let output = timeout(timeout_duration, cmd.output())
            .await
            .map_err(|_| ConvergeError::Timeout {
                operation: format!("command execution: {}", command),
                seconds: timeout_duration.as_secs(),
            })?
            .map_err(|e| {
                ConvergeError::backend_with_source(
                    format!("Failed to execute command '{}': {}", command, e),
                    e,
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n{}", stdout, stderr)
        };

        debug!(
            service = service_name,
            exit_code = output.status.code(),
            stdout = %stdout,
            stderr = %stderr,
            "Command completed"
        );

        Ok((output.status.success(), combined_output))
    }

    /// Gets the current state of a service by running its status command.
    async fn get_service_state(
        &self,
        service_name: &str,
        definition: &ServiceDefinition,
    ) -> Result<ServiceState> {
        let (success, _output) = self
            .execute_command(&definition.status, service_name, definition)
            .await?;

        // Exit code 0 means running, anything else means stopped
        if success {
            Ok(ServiceState::Running)
        } else {
            Ok(ServiceState::Stopped)
        }
    }

    async fn run_and_verify(
        &self,
        service: &str,
        action: ServiceAction,
        definition: &ServiceDefinition,
    ) -> Result<ServiceOperationResult> {
        let (command, want_running) = match action {
            ServiceAction::Start => (&definition.start, true),
            ServiceAction::Stop => (&definition.stop, false),
            ServiceAction::Register => {
                return Err(ConvergeError::backend("register is not a run-state action"))
            }
        };

        let (success, output) = self.execute_command(command, service, definition).await?;

        if !success {
            error!(
                service = service,
                action = %action,
                output = %output,
                "Service command failed"
            );
            return Ok(ServiceOperationResult::failure(
                service,
                action,
                ServiceState::Failed,
                output,
            ));
        }

        let new_state = self.get_service_state(service, definition).await?;

        if new_state.is_running() == want_running {
            info!(service = service, action = %action, "Service command succeeded");
            Ok(ServiceOperationResult::success(service, action, new_state))
        } else {
            warn!(
                service = service,
                action = %action,
                state = %new_state,
                "Service did not reach the expected state"
            );
            Ok(ServiceOperationResult::failure(
                service,
                action,
                new_state,
                format!("Service did not {} properly", action),
            ))
        }
    }
}

#[async_trait]
impl ServiceBackend for ExecBackend {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn exists(&self, service: &str) -> Result<bool> {
        match self.services.get(service) {
            Some(definition) => self.is_registered(service, definition).await,
            None => Ok(false),
        }
    }

    async fn status(&self, service: &str) -> Result<ServiceStatus> {
        let Some(definition) = self.services.get(service) else {
            return Ok(ServiceStatus::absent(service));
        };
        if !self.is_registered(service, definition).await? {
            return Ok(ServiceStatus::absent(service));
        }

        let state = self.get_service_state(service, definition).await?;
        Ok(ServiceStatus::new(service, state))
    }

    async fn start(&self, service: &str) -> Result<ServiceOperationResult> {
        let definition = self.registered_service(service).await?;
        info!(service = service, "Starting service");
        self.run_and_verify(service, ServiceAction::Start, definition)
            .await
    }

    async fn stop(&self, service: &str) -> Result<ServiceOperationResult> {
        let definition = self.registered_service(service).await?;
        info!(service = service, "Stopping service");
        self.run_and_verify(service, ServiceAction::Stop, definition)
            .await
    }

    async fn register(&self, unit: &ServiceUnit) -> Result<ServiceOperationResult> {
        let service = unit.name.as_str();
        let definition = self
            .services
            .get(service)
            .ok_or_else(|| ConvergeError::ServiceNotFound {
                service: service.to_string(),
            })?;

        let Some(command) = &definition.register else {
            return Err(ConvergeError::backend(format!(
                "services.{}.register is not defined; set service.register to false \
                 to manage registration externally",
                service
            )));
        };

        info!(service = service, "Registering service");
        let (success, output) = self.execute_command(command, service, definition).await?;

        if !success {
            error!(service = service, output = %output, "Failed to register service");
            return Ok(ServiceOperationResult::failure(
                service,
                ServiceAction::Register,
                ServiceState::Absent,
                output,
            ));
        }

        let state = self.status(service).await?.state;
        if state.is_registered() {
            Ok(ServiceOperationResult::success(
                service,
                ServiceAction::Register,
                state,
            ))
        } else {
            Ok(ServiceOperationResult::failure(
                service,
                ServiceAction::Register,
                state,
                "Service is still not registered after the register command",
            ))
        }
    }
}
