//! Reconciler - drives the agent from its actual to its desired state.
//!
//! Planning is a pure function of desired and actual state; the
//! [`Reconciler`] observes, plans and then executes the plan in order,
//! stopping at the first failure. Nothing is rolled back, and a later run
//! resumes from whatever state the failed run left behind.

mod actions;

pub use actions::{Action, Plan};

use crate::config::{Config, DesiredState, Presence, RunState};
use crate::error::{ConvergeError, Phase, Result};
use crate::install::{InstallLayout, InstallRequest, Installer};
use crate::service::{ServiceController, ServiceUnit};
use crate::state::{ActualState, StateReader};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Knobs for [`plan`] that do not belong to the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Follow an install with registering the OS service.
    pub register: bool,
    /// Account the registered service runs as.
    pub user: Option<String>,
    pub layout: InstallLayout,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            register: true,
            user: None,
            layout: InstallLayout::default(),
        }
    }
}

impl PlanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            register: config.service.register,
            user: config.service.user.clone(),
            layout: InstallLayout::default(),
        }
    }

    /// Service registration for an agent installed per `request`.
    pub fn service_unit(&self, request: &InstallRequest) -> ServiceUnit {
        let script = self.layout.marker_path(&request.install_dir);
        ServiceUnit {
            name: request.name.clone(),
            description: format!("Build agent {}", request.name),
            working_dir: request.install_dir.clone(),
            exec_start: format!("{} run", script.display()),
            exec_stop: format!("{} stop", script.display()),
            user: self.user.clone(),
        }
    }
}

/// Computes the actions that take `actual` to `desired`.
///
/// Pure and deterministic. Fails only when an install is needed and the
/// desired state lacks what installing requires.
pub fn plan(desired: &DesiredState, actual: &ActualState, options: &PlanOptions) -> Result<Plan> {
    let mut plan = Plan::new();
    let mut run_state = actual.run_state;

    if desired.run_state == RunState::Stopped && run_state == RunState::Started {
        plan.push(Action::Stop);
        run_state = RunState::Stopped;
    }

    match (desired.presence, actual.presence) {
        (Presence::Absent, Presence::Present) => {
            plan.push(Action::Uninstall);
        }
        (Presence::Present, Presence::Absent) => {
            let request = InstallRequest::from_desired(desired)?;
            let register = options.register.then(|| options.service_unit(&request));
            plan.push(Action::Install(request));
            if let Some(unit) = register {
                plan.push(Action::Register(unit));
            }
        }
        _ => {}
    }

    if desired.run_state == RunState::Started && run_state == RunState::Stopped {
        plan.push(Action::Start);
    }

    Ok(plan)
}

/// Outcome of a successful [`Reconciler::apply`].
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub run_id: Uuid,
    pub agent: String,
    /// Executed actions, in order. Empty when nothing had to change.
    pub actions: Vec<Action>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Observes, plans and executes.
#[derive(Clone)]
pub struct Reconciler {
    reader: StateReader,
    installer: Installer,
    controller: ServiceController,
    options: PlanOptions,
}

impl Reconciler {
    pub fn new(controller: ServiceController, installer: Installer, options: PlanOptions) -> Self {
        let reader = StateReader::new(controller.clone(), options.layout.clone());
        Self {
            reader,
            installer,
            controller,
            options,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ServiceController::from_config(config)?,
            Installer::from_config(config)?,
            PlanOptions::from_config(config),
        ))
    }

    pub fn reader(&self) -> &StateReader {
        &self.reader
    }

    /// Validates, reads and plans without changing anything.
    pub async fn plan(&self, desired: &DesiredState) -> Result<Plan> {
        desired.validate()?;
        let actual = self.read(desired).await?;
        plan(desired, &actual, &self.options)
    }

    /// Converges the agent to `desired`.
    pub async fn apply(&self, desired: &DesiredState) -> Result<ApplyReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("apply", run_id = %run_id, agent = %desired.name);
        self.apply_run(run_id, desired).instrument(span).await
    }

    async fn apply_run(&self, run_id: Uuid, desired: &DesiredState) -> Result<ApplyReport> {
        let started_at = Utc::now();

        let plan = self.plan(desired).await?;
        if plan.is_empty() {
            info!("Agent already in desired state");
        }

        let mut executed = Vec::with_capacity(plan.len());
        for action in plan {
            info!(action = %action, "Executing");
            if let Err(e) = self.execute(&action, desired).await {
                let e = e.in_phase(action.phase());
                error!(phase = %action.phase(), error = %e, "Reconciliation aborted");
                return Err(e);
            }
            executed.push(action);
        }

        let finished_at = Utc::now();
        info!(actions = executed.len(), "Reconciliation complete");

        Ok(ApplyReport {
            run_id,
            agent: desired.name.clone(),
            actions: executed,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
        })
    }

    async fn read(&self, desired: &DesiredState) -> Result<ActualState> {
        self.reader
            .read(&desired.name, &desired.install_dir)
            .await
            .map_err(|e| e.in_phase(Phase::Read))
    }

    async fn execute(&self, action: &Action, desired: &DesiredState) -> Result<()> {
        match action {
            Action::Stop => {
                self.controller.stop(&desired.name).await?;
            }
            Action::Uninstall => {
                return Err(ConvergeError::unsupported(format!(
                    "removing installed agent '{}'",
                    desired.name
                )));
            }
            Action::Install(request) => {
                self.installer.install(request).await?;
            }
            Action::Register(unit) => {
                self.controller.register(unit).await?;
            }
            Action::Start => {
                self.controller.start(&desired.name).await?;
            }
        }
        Ok(())
    }
}
