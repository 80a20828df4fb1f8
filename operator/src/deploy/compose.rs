//! Docker Compose engine

use std::path::PathBuf;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::OpsError;

/// Container engine operations the procedures rely on
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Probe the container runtime; true once it answers
    async fn is_ready(&self) -> bool;

    /// Bring the stack up in the background
    async fn up(&self) -> Result<(), OpsError>;

    /// Tear the stack down
    async fn down(&self) -> Result<(), OpsError>;

    /// Names of the services currently reported running
    async fn running_services(&self) -> Result<Vec<String>, OpsError>;
}

/// Which compose front-end runs the stack commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose` plugin
    Plugin,
    /// Standalone `docker-compose` binary
    Legacy,
}

/// `docker compose` driven engine, falling back to the legacy `docker-compose`
/// when the plugin is not installed
#[derive(Debug, Clone)]
pub struct ComposeEngine {
    work_dir: PathBuf,
    descriptor: PathBuf,
    docker: PathBuf,
    legacy: PathBuf,
    flavor: OnceCell<ComposeFlavor>,
}

impl ComposeEngine {
    pub fn new(work_dir: impl Into<PathBuf>, descriptor: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            descriptor: descriptor.into(),
            docker: PathBuf::from("docker"),
            legacy: PathBuf::from("docker-compose"),
            flavor: OnceCell::new(),
        }
    }

    /// Use other `docker` and `docker-compose` executables
    pub fn with_binaries(
        mut self,
        docker: impl Into<PathBuf>,
        legacy: impl Into<PathBuf>,
    ) -> Self {
        self.docker = docker.into();
        self.legacy = legacy.into();
        self
    }

    /// Compose front-end in use, detected once with `docker compose version`
    pub async fn flavor(&self) -> ComposeFlavor {
        *self
            .flavor
            .get_or_init(|| async {
                let plugin = Command::new(&self.docker)
                    .args(["compose", "version"])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .map(|status| status.success())
                    .unwrap_or(false);
                if plugin {
                    ComposeFlavor::Plugin
                } else {
                    info!("docker compose plugin not found, using docker-compose");
                    ComposeFlavor::Legacy
                }
            })
            .await
    }

    async fn compose(&self, args: &[&str]) -> Result<Output, OpsError> {
        let flavor = self.flavor().await;
        let mut command = match flavor {
            ComposeFlavor::Plugin => {
                let mut command = Command::new(&self.docker);
                command.arg("compose");
                command
            }
            ComposeFlavor::Legacy => Command::new(&self.legacy),
        };
        debug!("Running {:?} compose {}...", flavor, args.join(" "));

        let output = command
            .current_dir(&self.work_dir)
            .arg("-f")
            .arg(&self.descriptor)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                OpsError::CommandError(format!(
                    "docker compose {} failed to run: {}",
                    args.join(" "),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(OpsError::CommandError(format!(
                "docker compose {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl ContainerEngine for ComposeEngine {
    async fn is_ready(&self) -> bool {
        Command::new(&self.docker)
            .arg("info")
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn up(&self) -> Result<(), OpsError> {
        info!("Starting stack from {}", self.descriptor.display());
        self.compose(&["up", "-d"]).await?;
        Ok(())
    }

    async fn down(&self) -> Result<(), OpsError> {
        info!("Stopping stack from {}", self.descriptor.display());
        self.compose(&["down"]).await?;
        Ok(())
    }

    async fn running_services(&self) -> Result<Vec<String>, OpsError> {
        let output = self
            .compose(&["ps", "--services", "--filter", "status=running"])
            .await?;
        Ok(parse_service_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_service_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
