//! Installer - puts the agent on disk.
//!
//! Every step is skipped when its postcondition already holds, except
//! unpacking, which is repeated on each install and overwrites in place.
//! The installer never registers the OS service.

pub mod fetch;
pub mod properties;
pub mod unpack;

use crate::config::{Config, DesiredState};
use crate::error::{ConvergeError, Result};
use fetch::{BundleFetcher, HttpFetcher};
use properties::{rewrite_config_lines, Replacement};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed file locations relative to the installation directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// Script whose presence marks an installation; also the service entry point.
    pub marker: PathBuf,
    /// Local copy of the downloaded bundle.
    pub bundle: PathBuf,
    /// Configuration template shipped in the bundle.
    pub config_template: PathBuf,
    /// Generated agent configuration.
    pub config: PathBuf,
}

impl Default for InstallLayout {
    fn default() -> Self {
        Self {
            marker: PathBuf::from("bin/agent.sh"),
            bundle: PathBuf::from("buildAgent.tar.gz"),
            config_template: PathBuf::from("conf/buildAgent.dist.properties"),
            config: PathBuf::from("conf/buildAgent.properties"),
        }
    }
}

impl InstallLayout {
    pub fn marker_path(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(&self.marker)
    }

    pub fn bundle_path(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(&self.bundle)
    }

    pub fn config_template_path(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(&self.config_template)
    }

    pub fn config_path(&self, install_dir: &Path) -> PathBuf {
        install_dir.join(&self.config)
    }
}

/// Everything the installer needs, checked to be complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRequest {
    pub name: String,
    pub bundle_url: String,
    pub install_dir: PathBuf,
    pub service_port: u16,
    pub controller_host: String,
    pub controller_port: u16,
}

impl InstallRequest {
    /// Builds a request from desired state.
    ///
    /// Fails with a validation error when a field needed only for
    /// installation is missing.
    pub fn from_desired(desired: &DesiredState) -> Result<Self> {
        let request = Self {
            name: desired.name.clone(),
            bundle_url: desired.bundle_url.clone().unwrap_or_default(),
            install_dir: desired.install_dir.clone(),
            service_port: desired.service_port,
            controller_host: desired.controller_host.clone().unwrap_or_default(),
            controller_port: desired.controller_port,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", self.name.trim().is_empty()),
            ("bundle_url", self.bundle_url.trim().is_empty()),
            ("install_dir", self.install_dir.as_os_str().is_empty()),
            ("controller_host", self.controller_host.trim().is_empty()),
        ];
        for (field, missing) in required {
            if missing {
                return Err(ConvergeError::validation(format!(
                    "{} is required to install agent '{}'",
                    field, self.name
                )));
            }
        }

        if self.service_port == 0 || self.controller_port == 0 {
            return Err(ConvergeError::validation("ports must be > 0"));
        }

        Ok(())
    }

    /// URL of the controller the agent reports to.
    pub fn controller_url(&self) -> String {
        let host = self.controller_host.trim_end_matches('/');
        if host.contains("://") {
            format!("{}:{}", host, self.controller_port)
        } else {
            format!("http://{}:{}", host, self.controller_port)
        }
    }

    /// Lines rewritten in the generated agent configuration.
    pub fn replacements(&self) -> Vec<Replacement> {
        vec![
            Replacement::new("serverUrl", self.controller_url()),
            Replacement::new("name", &self.name),
            Replacement::new("ownPort", self.service_port),
        ]
    }
}

/// Installs the agent from its bundle.
#[derive(Clone)]
pub struct Installer {
    fetcher: Arc<dyn BundleFetcher>,
    layout: InstallLayout,
}

impl Installer {
    pub fn new(fetcher: Arc<dyn BundleFetcher>, layout: InstallLayout) -> Self {
        Self { fetcher, layout }
    }

    /// Creates an installer that downloads over HTTP within the configured timeout.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.timeout.download())?;
        Ok(Self::new(Arc::new(fetcher), InstallLayout::default()))
    }

    pub async fn install(&self, request: &InstallRequest) -> Result<()> {
        request.validate()?;
        let dir = &request.install_dir;

        info!(
            agent = %request.name,
            install_dir = %dir.display(),
            "Installing agent"
        );

        if !tokio::fs::try_exists(dir).await? {
            debug!(install_dir = %dir.display(), "Creating install directory");
            tokio::fs::create_dir_all(dir).await?;
        }

        let bundle = self.ensure_bundle(&request.bundle_url, dir).await?;

        info!(bundle = %bundle.display(), "Unpacking bundle");
        unpack::unpack(&bundle, dir).await?;

        self.configure(request).await?;

        info!(agent = %request.name, "Agent installed");
        Ok(())
    }

    /// Downloads the bundle unless a local copy already exists.
    async fn ensure_bundle(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let bundle = self.layout.bundle_path(dir);
        if tokio::fs::try_exists(&bundle).await? {
            debug!(bundle = %bundle.display(), "Bundle already present, skipping download");
            return Ok(bundle);
        }

        let mut partial_name = bundle.file_name().unwrap_or_default().to_os_string();
        partial_name.push(".part");
        let partial = bundle.with_file_name(partial_name);

        info!(url = %url, "Downloading bundle");
        if let Err(e) = self.fetcher.fetch(url, &partial).await {
            match tokio::fs::remove_file(&partial).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => warn!(
                    path = %partial.display(),
                    error = %cleanup,
                    "Failed to remove partial download"
                ),
            }
            return Err(e);
        }
        tokio::fs::rename(&partial, &bundle).await?;

        Ok(bundle)
    }

    /// Generates the agent configuration from its template and rewrites
    /// the controller URL, name and port lines.
    async fn configure(&self, request: &InstallRequest) -> Result<()> {
        let dir = &request.install_dir;
        let config = self.layout.config_path(dir);

        if !tokio::fs::try_exists(&config).await? {
            let template = self.layout.config_template_path(dir);
            if !tokio::fs::try_exists(&template).await? {
                return Err(ConvergeError::Unpack {
                    archive: self.layout.bundle_path(dir).display().to_string(),
                    message: format!("bundle has no {}", self.layout.config_template.display()),
                });
            }
            debug!(template = %template.display(), "Generating agent configuration");
            tokio::fs::copy(&template, &config).await?;
        }

        let unmatched = rewrite_config_lines(&config, &request.replacements()).await?;
        for key in unmatched {
            warn!(
                key = %key,
                config = %config.display(),
                "No placeholder line for key, left unset"
            );
        }

        Ok(())
    }
}
