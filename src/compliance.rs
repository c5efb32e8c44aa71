//! Compliance checker - answers "is the agent already as desired?".

use crate::config::DesiredState;
use crate::error::Result;
use crate::state::{ActualState, StateReader};
use tracing::info;

/// Compares presence first, then run state, and stops at the first mismatch.
pub fn compare(desired: &DesiredState, actual: &ActualState) -> bool {
    if desired.presence != actual.presence {
        info!(
            agent = %desired.name,
            desired = %desired.presence,
            actual = %actual.presence,
            "Presence does not match"
        );
        return false;
    }

    if desired.run_state != actual.run_state {
        info!(
            agent = %desired.name,
            desired = %desired.run_state,
            actual = %actual.run_state,
            "Run state does not match"
        );
        return false;
    }

    true
}

/// Read-only compliance check against the live system.
#[derive(Clone)]
pub struct ComplianceChecker {
    reader: StateReader,
}

impl ComplianceChecker {
    pub fn new(reader: StateReader) -> Self {
        Self { reader }
    }

    /// Validates `desired`, reads the actual state and compares. Never mutates.
    pub async fn is_compliant(&self, desired: &DesiredState) -> Result<bool> {
        desired.validate()?;
        let actual = self.reader.read(&desired.name, &desired.install_dir).await?;
        Ok(compare(desired, &actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Presence, RunState};
    use crate::service::ServiceState;

    fn desired(presence: Presence, run_state: RunState) -> DesiredState {
        DesiredState {
            presence,
            run_state,
            ..DesiredState::new("Agent1")
        }
    }

    #[test]
    fn test_compare_matching() {
        let actual = ActualState::observe(ServiceState::Running, true);
        assert!(compare(&desired(Presence::Present, RunState::Started), &actual));

        let actual = ActualState::observe(ServiceState::Absent, false);
        assert!(compare(&desired(Presence::Absent, RunState::Stopped), &actual));
    }

    #[test]
    fn test_compare_run_state_mismatch() {
        let actual = ActualState::observe(ServiceState::Stopped, true);
        assert!(!compare(&desired(Presence::Present, RunState::Started), &actual));
    }

    #[test]
    fn test_compare_presence_mismatch() {
        let actual = ActualState::observe(ServiceState::Absent, false);
        assert!(!compare(&desired(Presence::Present, RunState::Stopped), &actual));

        let actual = ActualState::observe(ServiceState::Stopped, true);
        assert!(!compare(&desired(Presence::Absent, RunState::Stopped), &actual));
    }

    #[test]
    fn test_failed_service_counts_as_stopped() {
        let actual = ActualState::observe(ServiceState::Failed, true);
        assert!(compare(&desired(Presence::Present, RunState::Stopped), &actual));
    }
}
