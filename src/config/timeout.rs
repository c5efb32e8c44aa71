//! Timeout configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded-wait policy for the blocking collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-command service manager timeout in seconds.
    pub service_seconds: u64,

    /// Whole bundle download timeout in seconds.
    pub download_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            service_seconds: 60,
            download_seconds: 600,
        }
    }
}

impl TimeoutConfig {
    pub fn service(&self) -> Duration {
        Duration::from_secs(self.service_seconds)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_seconds)
    }
}
