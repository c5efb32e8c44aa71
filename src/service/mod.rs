//! Service module - Service management and backends.
//!
//! This module provides the service management layer for agent-converge,
//! including the backend trait and implementations for systemd and exec backends.

pub mod backend;
pub mod exec;
pub mod systemd;


use crate::config::{Backend, Config};
use crate::error::{ConvergeError, Result};
use exec::ExecBackend;
use std::sync::Arc;
use systemd::SystemdBackend;
use tracing::debug;

// Re-exports for convenience
pub use backend::{
    ServiceAction, ServiceBackend, ServiceOperationResult, ServiceState, ServiceStatus,
    ServiceUnit,
};

/// Service controller that manages service operations.
///
/// The controller routes operations to the configured backend and turns a
/// failed operation into an error, so callers never have to inspect
/// `ServiceOperationResult::success` themselves.
#[derive(Clone)]
pub struct ServiceController {
    /// The active backend.
    backend: Arc<dyn ServiceBackend>,
}

impl ServiceController {
    /// Creates a controller over an existing backend.
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }

    /// Creates a new service controller from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(create_backend(config)?))
    }

    /// Returns the name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Queries the state of a service. `Absent` when it is not registered.
    pub async fn query(&self, service: &str) -> Result<ServiceState> {
        let status = self.backend.status(service).await?;
        debug!(service = service, state = %status.state, "Queried service");
        Ok(status.state)
    }

    /// Starts a service. Fails if it is not registered or does not start.
    pub async fn start(&self, service: &str) -> Result<ServiceOperationResult> {
        expect_success(self.backend.start(service).await?)
    }

    /// Stops a service. Fails if it is not registered or does not stop.
    pub async fn stop(&self, service: &str) -> Result<ServiceOperationResult> {
        expect_success(self.backend.stop(service).await?)
    }

    /// Registers a service with the OS service manager.
    pub async fn register(&self, unit: &ServiceUnit) -> Result<ServiceOperationResult> {
        expect_success(self.backend.register(unit).await?)
    }
}

fn expect_success(result: ServiceOperationResult) -> Result<ServiceOperationResult> {
    if result.success {
        return Ok(result);
    }
    Err(ConvergeError::Service {
        service: result.service,
        action: result.action.to_string(),
        message: result
            .message
            .map(|m| m.trim().to_string())
            .unwrap_or_else(|| format!("service is {}", result.state)),
    })
}

/// Creates a service backend from configuration.
pub fn create_backend(config: &Config) -> Result<Arc<dyn ServiceBackend>> {
    let timeout = config.timeout.service();
    match config.service.backend {
        Backend::Systemd => Ok(Arc::new(SystemdBackend::new(
            config.service.unit_dir.clone(),
            timeout,
        ))),
        Backend::Exec => {
            if config.services.is_empty() {
                return Err(ConvergeError::config(
                    "Exec backend requires at least one service definition",
                ));
            }
            Ok(Arc::new(ExecBackend::new(config.services.clone(), timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceDefinition;
    use std::collections::HashMap;

    fn create_exec_config() -> Config {
        let mut config = Config::default();
        config.agent.name = "test-service".to_string();
        config.service.backend = Backend::Exec;

        let mut services = HashMap::new();
        services.insert(
            "test-service".to_string(),
            ServiceDefinition {
                start: "echo starting".to_string(),
                stop: "echo stopping".to_string(),
                status: "true".to_string(),
                ..Default::default()
            },
        );
        services.insert(
            "dead-service".to_string(),
            ServiceDefinition {
                start: "echo starting".to_string(),
                stop: "echo stopping".to_string(),
                status: "false".to_string(),
                ..Default::default()
            },
        );
        config.services = services;

        config
    }

    #[test]
    fn test_service_controller_from_exec_config() {
        let config = create_exec_config();
        let controller = ServiceController::from_config(&config).unwrap();

        assert_eq!(controller.backend_name(), "exec");
    }

    #[test]
    fn test_service_controller_from_systemd_config() {
        let config = Config::default();
        let controller = ServiceController::from_config(&config).unwrap();

        assert_eq!(controller.backend_name(), "systemd");
    }

    #[test]
    fn test_exec_backend_requires_services() {
        let mut config = Config::default();
        config.service.backend = Backend::Exec;

        assert!(create_backend(&config).is_err());
    }

    #[tokio::test]
    async fn test_query() {
        let controller = ServiceController::from_config(&create_exec_config()).unwrap();

        assert_eq!(
            controller.query("test-service").await.unwrap(),
            ServiceState::Running
        );
        assert_eq!(
            controller.query("dead-service").await.unwrap(),
            ServiceState::Stopped
        );
        assert_eq!(
            controller.query("nonexistent").await.unwrap(),
            ServiceState::Absent
        );
    }

    #[tokio::test]
    async fn test_failed_start_becomes_error() {
        let controller = ServiceController::from_config(&create_exec_config()).unwrap();

        // dead-service never reports running
        let err = controller.start("dead-service").await.unwrap_err();
        match err {
            ConvergeError::Service {
                service, action, ..
            } => {
                assert_eq!(service, "dead-service");
                assert_eq!(action, "start");
            }
            other => panic!("Expected service error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_stop_not_found() {
        let controller = ServiceController::from_config(&create_exec_config()).unwrap();

        let err = controller.stop("nonexistent").await.unwrap_err();
        assert!(matches!(err, ConvergeError::ServiceNotFound { .. }));
    }
}
