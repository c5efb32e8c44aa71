//! agent-converge - Declarative convergence for a service-backed build agent
//!
//! This crate brings a build agent on the local host to a desired state:
//! installed or not, running or not. It reads the actual state, plans the
//! actions needed to close the gap, and executes them in order.
//!
//! # Overview
//!
//! The agent is installed from a downloadable bundle, configured through a
//! handful of `key=value` lines, and run as an OS service. Every operation
//! is safe to repeat: a converged agent yields an empty plan.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`compliance`] - Desired vs. actual comparison
//! - [`config`] - Configuration file parsing and validation
//! - [`error`] - Error types and error handling
//! - [`install`] - Bundle download, extraction and configuration
//! - [`reconcile`] - Planning and executing convergence actions
//! - [`resource`] - The agent as a declarative resource
//! - [`service`] - Service backends (systemd, exec)
//! - [`state`] - Observation of the actual state

pub mod cli;
pub mod compliance;
pub mod config;
pub mod error;
pub mod install;
pub mod reconcile;
pub mod resource;
pub mod service;
pub mod state;

// Re-exports for convenience
pub use cli::Cli;
pub use config::{Config, DesiredState, Presence, RunState};
pub use error::{ConvergeError, ErrorCode, ErrorKind, Result};
pub use reconcile::{Action, ApplyReport, Plan, Reconciler};
pub use resource::AgentResource;
pub use service::ServiceController;
pub use state::{ActualState, StateReader};
