//! Background launch of the resident supervisor

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::errors::OpsError;

/// A unit of work started in the background
pub trait Launched: Send {
    /// Still running right now; a quick check, not a health guarantee
    fn is_alive(&mut self) -> bool;
}

impl Launched for Child {
    fn is_alive(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }
}

/// Starts the supervisor without waiting for it
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Launched>, OpsError>;
}

/// Re-executes this binary as `start` in a detached process
#[derive(Debug, Clone)]
pub struct SelfLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    work_dir: PathBuf,
}

impl SelfLauncher {
    /// Launch the running executable with `global_args` placed before `start`
    pub fn current(work_dir: impl Into<PathBuf>, global_args: Vec<OsString>) -> Result<Self, OpsError> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: global_args,
            work_dir: work_dir.into(),
        })
    }
}

#[async_trait]
impl Launcher for SelfLauncher {
    async fn launch(&self) -> Result<Box<dyn Launched>, OpsError> {
        debug!("Spawning {} {:?} start", self.program.display(), self.args);
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("start")
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        // Own process group, so terminal signals aimed at us do not reach it
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| OpsError::CommandError(format!("Failed to launch supervisor: {}", e)))?;
        info!("Supervisor launched in background (pid {:?})", child.id());
        Ok(Box::new(child))
    }
}
