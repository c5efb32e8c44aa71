//! Error types and error handling for agent-converge.
//!
//! This module defines the error type shared by every component, the error
//! codes used in log output, the taxonomy callers branch on, and the CLI
//! exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes, one per error family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// E001: Configuration file is invalid
    #[serde(rename = "E001")]
    ConfigInvalid,

    /// E002: Desired state is invalid
    #[serde(rename = "E002")]
    ValidationFailed,

    /// E003: Operation is not supported
    #[serde(rename = "E003")]
    Unsupported,

    /// E004: Managed service does not exist
    #[serde(rename = "E004")]
    ServiceNotFound,

    /// E005: Service operation failed
    #[serde(rename = "E005")]
    ServiceFailed,

    /// E006: Backend operation failed
    #[serde(rename = "E006")]
    BackendError,

    /// E007: Operation timed out
    #[serde(rename = "E007")]
    Timeout,

    /// E008: Bundle download failed
    #[serde(rename = "E008")]
    DownloadFailed,

    /// E009: Bundle extraction failed
    #[serde(rename = "E009")]
    UnpackFailed,
}

impl ErrorCode {
    /// Returns the error code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalid => "E001",
            ErrorCode::ValidationFailed => "E002",
            ErrorCode::Unsupported => "E003",
            ErrorCode::ServiceNotFound => "E004",
            ErrorCode::ServiceFailed => "E005",
            ErrorCode::BackendError => "E006",
            ErrorCode::Timeout => "E007",
            ErrorCode::DownloadFailed => "E008",
            ErrorCode::UnpackFailed => "E009",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse error taxonomy.
///
/// `Validation` and `Unsupported` are permanent: retrying the same desired
/// state cannot succeed. `Infrastructure` errors may clear once the
/// underlying cause is fixed, and re-running `apply` resumes from wherever
/// the failed run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Unsupported,
    Infrastructure,
}

/// Reconciliation phase an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Validate,
    Read,
    Stop,
    Uninstall,
    Install,
    Register,
    Start,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Validate => "validate",
            Phase::Read => "read",
            Phase::Stop => "stop",
            Phase::Uninstall => "uninstall",
            Phase::Install => "install",
            Phase::Register => "register",
            Phase::Start => "start",
        };
        f.write_str(s)
    }
}

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 2;
    /// Desired state failed validation
    pub const VALIDATION_ERROR: i32 = 3;
    /// Requested operation is not supported
    pub const UNSUPPORTED: i32 = 4;
    /// Timeout error
    pub const TIMEOUT_ERROR: i32 = 5;
    /// `test` found the agent out of compliance
    pub const NOT_COMPLIANT: i32 = 6;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
}

/// The main error type for agent-converge.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Configuration file is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Desired state is self-contradictory or incomplete.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Requested operation is intentionally not implemented.
    #[error("Unsupported operation: {operation} is not supported")]
    Unsupported { operation: String },

    /// Managed service is not registered.
    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    /// Service manager reported a failed start/stop/register.
    #[error("Service {action} failed for {service}: {message}")]
    Service {
        service: String,
        action: String,
        message: String,
    },

    /// Backend operation failed.
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("Timeout: {operation} (waited {seconds}s)")]
    Timeout { operation: String, seconds: u64 },

    /// Bundle could not be fetched.
    #[error("Download error: {url}: {message}")]
    Download {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bundle could not be extracted.
    #[error("Unpack error: {archive}: {message}")]
    Unpack { archive: String, message: String },

    /// A reconciliation step failed; names the step.
    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<ConvergeError>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvergeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConvergeError::Config { .. } | ConvergeError::Yaml(_) => ErrorCode::ConfigInvalid,
            ConvergeError::Validation { .. } => ErrorCode::ValidationFailed,
            ConvergeError::Unsupported { .. } => ErrorCode::Unsupported,
            ConvergeError::ServiceNotFound { .. } => ErrorCode::ServiceNotFound,
            ConvergeError::Service { .. } => ErrorCode::ServiceFailed,
            ConvergeError::Backend { .. } | ConvergeError::Io(_) | ConvergeError::Json(_) => {
                ErrorCode::BackendError
            }
            ConvergeError::Timeout { .. } => ErrorCode::Timeout,
            ConvergeError::Download { .. } => ErrorCode::DownloadFailed,
            ConvergeError::Unpack { .. } => ErrorCode::UnpackFailed,
            ConvergeError::Phase { source, .. } => source.code(),
        }
    }

    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvergeError::Validation { .. } => ErrorKind::Validation,
            ConvergeError::Unsupported { .. } => ErrorKind::Unsupported,
            ConvergeError::Phase { source, .. } => source.kind(),
            _ => ErrorKind::Infrastructure,
        }
    }

    /// Returns the phase a reconciliation error was raised in, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ConvergeError::Phase { phase, .. } => Some(*phase),
            ConvergeError::Validation { .. } => Some(Phase::Validate),
            _ => None,
        }
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvergeError::Config { .. } | ConvergeError::Yaml(_) => exit_code::CONFIG_ERROR,
            ConvergeError::Validation { .. } => exit_code::VALIDATION_ERROR,
            ConvergeError::Unsupported { .. } => exit_code::UNSUPPORTED,
            ConvergeError::Timeout { .. } => exit_code::TIMEOUT_ERROR,
            ConvergeError::Phase { source, .. } => source.exit_code(),
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Wraps this error with the reconciliation phase it occurred in.
    ///
    /// Validation and unsupported-operation errors already say what went
    /// wrong and are returned unwrapped.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            ConvergeError::Validation { .. }
            | ConvergeError::Unsupported { .. }
            | ConvergeError::Phase { .. } => self,
            other => ConvergeError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        ConvergeError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConvergeError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ConvergeError::Validation {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        ConvergeError::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a backend error with a message.
    pub fn backend(message: impl Into<String>) -> Self {
        ConvergeError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a backend error with a message and source.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConvergeError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a download error.
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        ConvergeError::Download {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a download error with a source.
    pub fn download_with_source(
        url: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConvergeError::Download {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for agent-converge operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;
