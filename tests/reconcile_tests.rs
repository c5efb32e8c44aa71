//! End-to-end convergence tests.
//!
//! The exec backend stands in for the OS service manager: registration and
//! run state are flag files in a sandbox, and the bundle is served from a
//! `file://` URL.

use agent_converge::{
    Action, AgentResource, Config, ConvergeError, ErrorKind, Presence, RunState,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};

const PROPERTIES_TEMPLATE: &str = "\
## The address of the server
serverUrl=http://localhost:8111/

name=
ownPort=9090
workDir=../work
";

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let sandbox = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        write_bundle(&sandbox.bundle());
        sandbox
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn bundle(&self) -> PathBuf {
        self.path("buildAgent.tar.gz")
    }

    fn install_dir(&self) -> PathBuf {
        self.path("agent")
    }

    fn registered(&self) -> PathBuf {
        self.path("registered")
    }

    fn running(&self) -> PathBuf {
        self.path("running")
    }

    fn config(&self, presence: &str, run_state: &str) -> Config {
        let yaml = format!(
            r#"
agent:
  name: Agent1
  presence: {presence}
  run_state: {run_state}
  bundle_url: "file://{bundle}"
  install_dir: "{install_dir}"
  service_port: 9090
  controller_host: ci.example.com
  controller_port: 80
service:
  backend: exec
timeout:
  service_seconds: 10
services:
  Agent1:
    exists: "test -f '{registered}'"
    register: "touch '{registered}'"
    start: "touch '{running}'"
    stop: "rm -f '{running}'"
    status: "test -f '{running}'"
"#,
            bundle = self.bundle().display(),
            install_dir = self.install_dir().display(),
            registered = self.registered().display(),
            running = self.running().display(),
        );
        Config::load_from_str(&yaml).unwrap()
    }

    /// Puts a fully installed, registered agent in place.
    fn preinstall(&self, running: bool) {
        let bin = self.install_dir().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("agent.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(self.registered(), "").unwrap();
        if running {
            std::fs::write(self.running(), "").unwrap();
        }
    }
}

fn write_bundle(path: &Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, mode, contents) in [
        ("bin/agent.sh", 0o755, "#!/bin/sh\nexec java -jar ../lib/agent.jar \"$@\"\n"),
        ("conf/buildAgent.dist.properties", 0o644, PROPERTIES_TEMPLATE),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn action_names(actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .map(|a| {
            serde_json::to_value(a).unwrap()["action"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

// ============================================================================
// Convergence scenarios
// ============================================================================

#[tokio::test]
async fn test_install_and_start_from_nothing() {
    let sandbox = Sandbox::new();
    let config = sandbox.config("present", "started");
    let resource = AgentResource::from_config(&config).unwrap();

    assert!(!resource.is_compliant(&config.agent).await.unwrap());

    let report = resource.apply(&config.agent).await.unwrap();
    assert_eq!(
        action_names(&report.actions),
        vec!["install", "register", "start"]
    );

    let actual = resource.read(&config.agent).await.unwrap();
    assert_eq!(actual.presence, Presence::Present);
    assert_eq!(actual.run_state, RunState::Started);
    assert!(actual.files_present);
    assert!(resource.is_compliant(&config.agent).await.unwrap());

    let properties =
        std::fs::read_to_string(sandbox.install_dir().join("conf/buildAgent.properties"))
            .unwrap();
    assert_eq!(
        properties,
        "\
## The address of the server
serverUrl=http://ci.example.com:80

name=Agent1
ownPort=9090
workDir=../work
"
    );
}

#[tokio::test]
async fn test_converged_agent_is_left_alone() {
    let sandbox = Sandbox::new();
    sandbox.preinstall(true);
    let config = sandbox.config("present", "started");
    let resource = AgentResource::from_config(&config).unwrap();

    assert!(resource.is_compliant(&config.agent).await.unwrap());

    let report = resource.apply(&config.agent).await.unwrap();
    assert!(!report.changed());
    assert!(!sandbox.install_dir().join("buildAgent.tar.gz").exists());

    assert!(resource.is_compliant(&config.agent).await.unwrap());
}

#[tokio::test]
async fn test_stop_running_agent() {
    let sandbox = Sandbox::new();
    sandbox.preinstall(true);
    let config = sandbox.config("present", "stopped");
    let resource = AgentResource::from_config(&config).unwrap();

    let report = resource.apply(&config.agent).await.unwrap();
    assert_eq!(action_names(&report.actions), vec!["stop"]);

    let actual = resource.read(&config.agent).await.unwrap();
    assert_eq!(actual.presence, Presence::Present);
    assert_eq!(actual.run_state, RunState::Stopped);
    assert!(!sandbox.install_dir().join("buildAgent.tar.gz").exists());
}

#[tokio::test]
async fn test_registration_overrides_missing_files() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.registered(), "").unwrap();
    let config = sandbox.config("present", "stopped");
    let resource = AgentResource::from_config(&config).unwrap();

    let actual = resource.read(&config.agent).await.unwrap();

    assert_eq!(actual.presence, Presence::Present);
    assert!(!actual.files_present);
    assert!(resource.plan(&config.agent).await.unwrap().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_apply_twice_converges() {
    let sandbox = Sandbox::new();
    let config = sandbox.config("present", "started");
    let resource = AgentResource::from_config(&config).unwrap();

    resource.apply(&config.agent).await.unwrap();
    let first = resource.read(&config.agent).await.unwrap();

    let second = resource.apply(&config.agent).await.unwrap();
    assert!(second.actions.is_empty());

    let again = resource.read(&config.agent).await.unwrap();
    assert_eq!(again.presence, first.presence);
    assert_eq!(again.run_state, first.run_state);
}

#[tokio::test]
async fn test_absent_and_started_fails_before_any_io() {
    let sandbox = Sandbox::new();
    let mut config = sandbox.config("present", "started");
    config.agent.presence = Presence::Absent;
    // Would fail if the service manager were consulted
    config.services.get_mut("Agent1").unwrap().status = "/nonexistent/status".to_string();
    let resource = AgentResource::from_config(&config).unwrap();

    let err = resource.apply(&config.agent).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = resource.is_compliant(&config.agent).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(!sandbox.install_dir().exists());
}

#[tokio::test]
async fn test_removal_is_unsupported_after_stopping() {
    let sandbox = Sandbox::new();
    sandbox.preinstall(true);
    let config = sandbox.config("absent", "stopped");
    let resource = AgentResource::from_config(&config).unwrap();

    let err = resource.apply(&config.agent).await.unwrap_err();

    assert!(matches!(err, ConvergeError::Unsupported { .. }));
    assert!(!sandbox.running().exists());
    assert!(sandbox.registered().exists());
    assert!(sandbox.install_dir().join("bin/agent.sh").exists());
}

#[tokio::test]
async fn test_compliance_check_never_mutates() {
    let sandbox = Sandbox::new();
    let config = sandbox.config("present", "started");
    let resource = AgentResource::from_config(&config).unwrap();

    for _ in 0..2 {
        assert!(!resource.is_compliant(&config.agent).await.unwrap());
    }

    assert!(!sandbox.install_dir().exists());
    assert!(!sandbox.registered().exists());
    assert!(!sandbox.running().exists());
}

#[tokio::test]
async fn test_failed_download_names_install_phase() {
    let sandbox = Sandbox::new();
    let mut config = sandbox.config("present", "started");
    config.agent.bundle_url = Some(format!("file://{}", sandbox.path("missing.tar.gz").display()));
    let resource = AgentResource::from_config(&config).unwrap();

    let err = resource.apply(&config.agent).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(err.to_string().starts_with("install phase failed"));
    assert!(!sandbox.install_dir().join("buildAgent.tar.gz").exists());
    assert!(!sandbox.registered().exists());

    // The fixed URL resumes where the failed run stopped
    config.agent.bundle_url = Some(format!("file://{}", sandbox.bundle().display()));
    let report = resource.apply(&config.agent).await.unwrap();
    assert_eq!(report.actions.len(), 3);
}
