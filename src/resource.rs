//! The agent as a declarative resource.
//!
//! [`AgentResource`] wires the state reader, installer, service controller
//! and compliance checker together from one configuration and exposes the
//! four operations the CLI offers: read, plan, apply and test.

use crate::compliance::ComplianceChecker;
use crate::config::{Config, DesiredState};
use crate::error::Result;
use crate::reconcile::{ApplyReport, Plan, Reconciler};
use crate::state::ActualState;

#[derive(Clone)]
pub struct AgentResource {
    reconciler: Reconciler,
    checker: ComplianceChecker,
}

impl AgentResource {
    pub fn new(reconciler: Reconciler) -> Self {
        let checker = ComplianceChecker::new(reconciler.reader().clone());
        Self {
            reconciler,
            checker,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Reconciler::from_config(config)?))
    }

    /// Current state of the agent described by `desired`.
    pub async fn read(&self, desired: &DesiredState) -> Result<ActualState> {
        self.reconciler
            .reader()
            .read(&desired.name, &desired.install_dir)
            .await
    }

    pub async fn plan(&self, desired: &DesiredState) -> Result<Plan> {
        self.reconciler.plan(desired).await
    }

    pub async fn apply(&self, desired: &DesiredState) -> Result<ApplyReport> {
        self.reconciler.apply(desired).await
    }

    pub async fn is_compliant(&self, desired: &DesiredState) -> Result<bool> {
        self.checker.is_compliant(desired).await
    }
}
