//! Actions derived by the planner and executed by the reconciler.

use crate::error::Phase;
use crate::install::InstallRequest;
use crate::service::ServiceUnit;
use serde::Serialize;
use std::fmt;

/// One step towards the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Stop the running service.
    Stop,

    /// Remove an installed agent. Always refused when executed.
    Uninstall,

    /// Install the agent from its bundle.
    Install(InstallRequest),

    /// Register the installed agent with the OS service manager.
    Register(ServiceUnit),

    /// Start the service.
    Start,
}

impl Action {
    /// Phase reported when this action fails.
    pub fn phase(&self) -> Phase {
        match self {
            Action::Stop => Phase::Stop,
            Action::Uninstall => Phase::Uninstall,
            Action::Install(_) => Phase::Install,
            Action::Register(_) => Phase::Register,
            Action::Start => Phase::Start,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Stop => write!(f, "stop service"),
            Action::Uninstall => write!(f, "uninstall agent"),
            Action::Install(request) => write!(
                f,
                "install {} into {}",
                request.bundle_url,
                request.install_dir.display()
            ),
            Action::Register(unit) => write!(f, "register service {}", unit.name),
            Action::Start => write!(f, "start service"),
        }
    }
}

/// Ordered list of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// An empty plan means the agent has converged.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

impl IntoIterator for Plan {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn install_request() -> InstallRequest {
        InstallRequest {
            name: "Agent1".to_string(),
            bundle_url: "https://ci.example.com/update/buildAgent.tar.gz".to_string(),
            install_dir: PathBuf::from("/opt/buildagent"),
            service_port: 9090,
            controller_host: "ci.example.com".to_string(),
            controller_port: 80,
        }
    }

    #[test]
    fn test_action_phase() {
        assert_eq!(Action::Stop.phase(), Phase::Stop);
        assert_eq!(Action::Uninstall.phase(), Phase::Uninstall);
        assert_eq!(Action::Install(install_request()).phase(), Phase::Install);
        assert_eq!(Action::Start.phase(), Phase::Start);
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Stop.to_string(), "stop service");
        assert_eq!(
            Action::Install(install_request()).to_string(),
            "install https://ci.example.com/update/buildAgent.tar.gz into /opt/buildagent"
        );
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_value(Action::Start).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "start" }));

        let json = serde_json::to_value(Action::Install(install_request())).unwrap();
        assert_eq!(json["action"], "install");
        assert_eq!(json["name"], "Agent1");
        assert_eq!(json["service_port"], 9090);
    }

    #[test]
    fn test_plan_basic() {
        let mut plan = Plan::new();
        assert!(plan.is_empty());

        plan.push(Action::Stop);
        plan.push(Action::Uninstall);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions()[1], Action::Uninstall);
    }
}
