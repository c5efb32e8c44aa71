//! Service backend trait and common types.
//!
//! This module defines the `ServiceBackend` trait that all service backends
//! (systemd, exec) must implement, along with common types for service operations.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Service state as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// No service with that name is registered.
    Absent,
    /// Service is running.
    Running,
    /// Service is stopped.
    Stopped,
    /// Service has failed.
    Failed,
}

impl ServiceState {
    /// Whether a registration exists, whatever its run state.
    pub fn is_registered(&self) -> bool {
        *self != ServiceState::Absent
    }

    pub fn is_running(&self) -> bool {
        *self == ServiceState::Running
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Absent => write!(f, "absent"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Failed => write!(f, "failed"),
        }
    }
}

/// Service action to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    /// Start the service.
    Start,
    /// Stop the service.
    Stop,
    /// Register the service with the OS service manager.
    Register,
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Register => write!(f, "register"),
        }
    }
}

/// Result of a service operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOperationResult {
    /// The service name.
    pub service: String,
    /// The action performed.
    pub action: ServiceAction,
    /// Whether the operation succeeded.
    pub success: bool,
    /// The resulting state of the service.
    pub state: ServiceState,
    /// Optional message (e.g., error details).
    pub message: Option<String>,
}

impl ServiceOperationResult {
    /// Creates a successful operation result.
    pub fn success(service: impl Into<String>, action: ServiceAction, state: ServiceState) -> Self {
        Self {
            service: service.into(),
            action,
            success: true,
            state,
            message: None,
        }
    }

    /// Creates a failed operation result.
    pub fn failure(
        service: impl Into<String>,
        action: ServiceAction,
        state: ServiceState,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            action,
            success: false,
            state,
            message: Some(message.into()),
        }
    }
}

/// Service status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// The service name.
    pub name: String,
    /// Current state.
    pub state: ServiceState,
}

impl ServiceStatus {
    /// Creates a new service status.
    pub fn new(name: impl Into<String>, state: ServiceState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    /// Status of a service that is not registered.
    pub fn absent(name: impl Into<String>) -> Self {
        Self::new(name, ServiceState::Absent)
    }
}

/// What to register with the OS service manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUnit {
    /// Service name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Working directory of the service process.
    pub working_dir: PathBuf,
    /// Command line that starts the service.
    pub exec_start: String,
    /// Command line that stops the service.
    pub exec_stop: String,
    /// Account to run as.
    pub user: Option<String>,
}

/// Trait for service backends.
///
/// Backends start, stop, register and report the status of services on the
/// local system. A missing service is a state, not an error, for `exists`
/// and `status`; `start` and `stop` fail with `ServiceNotFound` instead.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &'static str;

    /// Checks whether a service registration exists.
    async fn exists(&self, service: &str) -> Result<bool>;

    /// Gets the status of a service.
    async fn status(&self, service: &str) -> Result<ServiceStatus>;

    /// Starts a service.
    async fn start(&self, service: &str) -> Result<ServiceOperationResult>;

    /// Stops a service.
    async fn stop(&self, service: &str) -> Result<ServiceOperationResult>;

    /// Registers a service.
    async fn register(&self, unit: &ServiceUnit) -> Result<ServiceOperationResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_state_display() {
        assert_eq!(format!("{}", ServiceState::Absent), "absent");
        assert_eq!(format!("{}", ServiceState::Running), "running");
        assert_eq!(format!("{}", ServiceState::Stopped), "stopped");
        assert_eq!(format!("{}", ServiceState::Failed), "failed");
    }

    #[test]
    fn test_service_state_predicates() {
        assert!(!ServiceState::Absent.is_registered());
        assert!(ServiceState::Stopped.is_registered());
        assert!(ServiceState::Failed.is_registered());
        assert!(ServiceState::Running.is_running());
        assert!(!ServiceState::Failed.is_running());
    }

    #[test]
    fn test_service_operation_result_failure() {
        let result = ServiceOperationResult::failure(
            "Agent1",
            ServiceAction::Start,
            ServiceState::Failed,
            "Permission denied",
        );

        assert_eq!(result.service, "Agent1");
        assert_eq!(result.action, ServiceAction::Start);
        assert!(!result.success);
        assert_eq!(result.state, ServiceState::Failed);
        assert_eq!(result.message, Some("Permission denied".to_string()));
    }

    #[test]
    fn test_service_status_absent() {
        let status = ServiceStatus::absent("Agent1");
        assert_eq!(status.name, "Agent1");
        assert_eq!(status.state, ServiceState::Absent);
    }

    #[test]
    fn test_service_state_serialization() {
        let json = serde_json::to_string(&ServiceState::Absent).unwrap();
        assert_eq!(json, "\"absent\"");

        let deserialized: ServiceState = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(deserialized, ServiceState::Running);
    }
}
