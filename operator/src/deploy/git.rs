//! Git version control client

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OpsError;

/// Version control operations used to record descriptor updates
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether the working directory is inside a work tree
    async fn is_work_tree(&self) -> bool;

    /// Whether `path` has uncommitted changes
    async fn has_changes(&self, path: &Path) -> Result<bool, OpsError>;

    /// Stage `path`
    async fn add(&self, path: &Path) -> Result<(), OpsError>;

    /// Commit `path` only, with `message`
    async fn commit(&self, path: &Path, message: &str) -> Result<(), OpsError>;

    /// Whether the current branch tracks a remote branch
    async fn has_upstream(&self) -> bool;

    /// Push the current branch to its upstream
    async fn push(&self) -> Result<(), OpsError>;
}

/// `git` command line client
#[derive(Debug, Clone)]
pub struct GitClient {
    work_dir: PathBuf,
}

impl GitClient {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    async fn git<I, S>(&self, args: I) -> Result<Output, OpsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        debug!("Running git {:?}", args);
        Command::new("git")
            .current_dir(&self.work_dir)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OpsError::VcsError(format!("Failed to run git: {}", e)))
    }

    async fn git_checked<I, S>(&self, what: &str, args: I) -> Result<Output, OpsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(OpsError::VcsError(format!(
                "Git {} failed: {}",
                what,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl VersionControl for GitClient {
    async fn is_work_tree(&self) -> bool {
        match self.git(["rev-parse", "--is-inside-work-tree"]).await {
            Ok(output) => {
                output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true"
            }
            Err(_) => false,
        }
    }

    async fn has_changes(&self, path: &Path) -> Result<bool, OpsError> {
        let output = self
            .git_checked(
                "status",
                [
                    OsStr::new("status"),
                    OsStr::new("--porcelain"),
                    OsStr::new("--"),
                    path.as_os_str(),
                ],
            )
            .await?;
        Ok(!output.stdout.iter().all(u8::is_ascii_whitespace))
    }

    async fn add(&self, path: &Path) -> Result<(), OpsError> {
        self.git_checked(
            "add",
            [OsStr::new("add"), OsStr::new("--"), path.as_os_str()],
        )
        .await?;
        Ok(())
    }

    async fn commit(&self, path: &Path, message: &str) -> Result<(), OpsError> {
        self.git_checked(
            "commit",
            [
                OsStr::new("commit"),
                OsStr::new("-m"),
                OsStr::new(message),
                OsStr::new("--"),
                path.as_os_str(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn has_upstream(&self) -> bool {
        self.git(["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn push(&self) -> Result<(), OpsError> {
        self.git_checked("push", ["push"]).await?;
        Ok(())
    }
}
