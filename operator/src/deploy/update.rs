//! Self-update of the deployment descriptor
//!
//! One linear pass over [`UpdateStep`]: fetch the upstream descriptor, compare
//! it with the deployed one and, when it changed, stop the stack, swap the
//! files, restart and record the change in git.
//!
//! The descriptor is a single-writer resource. Nothing guards against two
//! updates, or an update and a manual `docker compose`, running at once.
//! Interrupting a run between swap and cleanup can leave the backup behind.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::app::options::UpdateOptions;
use crate::deploy::compose::ContainerEngine;
use crate::deploy::fsm::{StepOutcome, UpdateFsm, UpdateState, UpdateStep};
use crate::deploy::git::VersionControl;
use crate::deploy::launcher::Launcher;
use crate::deploy::stop::stop_stack;
use crate::descriptor;
use crate::errors::OpsError;
use crate::http::client::DescriptorFetcher;
use crate::storage::layout::StorageLayout;
use crate::utils::sha256_hash;

/// How a successful update run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Upstream matched the deployed descriptor; nothing was touched
    UpToDate,

    /// The new descriptor is live and committed
    Updated { version: Option<String> },
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    pub warnings: Vec<String>,
}

/// External collaborators of the update
pub struct Collaborators<'a> {
    pub engine: &'a dyn ContainerEngine,
    pub vcs: &'a dyn VersionControl,
    pub fetcher: &'a dyn DescriptorFetcher,
    pub launcher: &'a dyn Launcher,
}

/// Descriptor updater
pub struct Updater<'a, S> {
    layout: &'a StorageLayout,
    options: &'a UpdateOptions,
    deps: Collaborators<'a>,
    sleep_fn: S,
    version: Option<String>,
}

impl<'a, S, F> Updater<'a, S>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    pub fn new(
        layout: &'a StorageLayout,
        options: &'a UpdateOptions,
        deps: Collaborators<'a>,
        sleep_fn: S,
    ) -> Self {
        Self {
            layout,
            options,
            deps,
            sleep_fn,
            version: None,
        }
    }

    /// Run every step until the update completes, ends early or fails
    pub async fn run(mut self) -> Result<UpdateReport, OpsError> {
        info!("Checking {} for descriptor updates", self.options.upstream_url);
        let mut fsm = UpdateFsm::new();

        while let Some(step) = fsm.current_step() {
            let outcome = self.execute(step).await;
            if let Err(e) = fsm.process(outcome) {
                error!("Update failed at {:?}: {}", step, e);
                return Err(e);
            }
        }

        let outcome = match fsm.state() {
            UpdateState::UpToDate => UpdateOutcome::UpToDate,
            UpdateState::Completed => UpdateOutcome::Updated {
                version: self.version.take(),
            },
            state => {
                return Err(OpsError::Internal(format!(
                    "update ended in non-terminal state {:?}",
                    state
                )))
            }
        };

        Ok(UpdateReport {
            outcome,
            warnings: fsm.warnings().to_vec(),
        })
    }

    async fn execute(&mut self, step: UpdateStep) -> StepOutcome {
        match step {
            UpdateStep::Preconditions => self.check_preconditions().await,
            UpdateStep::Fetch => self.fetch().await,
            UpdateStep::Diff => self.diff().await,
            UpdateStep::Stop => self.stop().await,
            UpdateStep::Swap => self.swap().await,
            UpdateStep::Restart => self.restart().await,
            UpdateStep::Cleanup => self.cleanup().await,
            UpdateStep::Commit => self.commit().await,
        }
    }

    async fn check_preconditions(&self) -> StepOutcome {
        if !self.deps.vcs.is_work_tree().await {
            return StepOutcome::Fatal(OpsError::Precondition(format!(
                "{} is not inside a git work tree",
                self.layout.work_dir.display()
            )));
        }

        let current = self.layout.descriptor_file();
        if !current.exists().await {
            return StepOutcome::Fatal(OpsError::Precondition(format!(
                "{} not found",
                current.path().display()
            )));
        }
        StepOutcome::Success
    }

    async fn fetch(&self) -> StepOutcome {
        let candidate = self.layout.candidate_file();
        match self
            .deps
            .fetcher
            .download(&self.options.upstream_url, &candidate)
            .await
        {
            Ok(bytes) => {
                info!("Downloaded {} bytes to {}", bytes, candidate.name());
                StepOutcome::Success
            }
            Err(e) => {
                discard(&candidate.delete().await, "candidate");
                StepOutcome::Fatal(OpsError::FetchError(format!(
                    "failed to download {}: {}",
                    self.options.upstream_url, e
                )))
            }
        }
    }

    async fn diff(&self) -> StepOutcome {
        let deployed = self.layout.descriptor_file();
        let candidate = self.layout.candidate_file();
        let contents = tokio::try_join!(deployed.read_string(), candidate.read_string());
        let (current, upstream) = match contents {
            Ok(pair) => pair,
            Err(e) => {
                discard(&candidate.delete().await, "candidate");
                return StepOutcome::Fatal(e);
            }
        };

        if upstream.trim().is_empty() {
            discard(&candidate.delete().await, "candidate");
            return StepOutcome::Fatal(OpsError::FetchError(format!(
                "upstream {} is empty",
                self.layout.descriptor_name
            )));
        }

        if descriptor::equivalent(&current, &upstream) {
            info!("No update needed, {} matches upstream", self.layout.descriptor_name);
            discard(&candidate.delete().await, "candidate");
            return StepOutcome::Finished;
        }

        let summary = descriptor::diff_summary(&current, &upstream);
        info!(
            "Upstream descriptor differs: +{} -{} lines (sha256 {} -> {})",
            summary.added,
            summary.removed,
            sha256_hash(current.as_bytes()),
            sha256_hash(upstream.as_bytes())
        );
        StepOutcome::Success
    }

    async fn stop(&self) -> StepOutcome {
        match stop_stack(self.deps.engine, self.layout).await {
            Ok(()) => StepOutcome::Success,
            Err(e) => StepOutcome::Warning(format!("failed to stop stack, continuing: {}", e)),
        }
    }

    async fn swap(&self) -> StepOutcome {
        let current = self.layout.descriptor_file();
        let backup = self.layout.backup_file();
        let candidate = self.layout.candidate_file();

        let backup_warning = match current.copy_to(&backup).await {
            Ok(()) => {
                info!("Backed up {} to {}", current.name(), backup.name());
                None
            }
            Err(e) => {
                // A stale backup from an earlier run must not be restored later
                discard(&backup.delete().await, "backup");
                Some(format!("failed to back up {}: {}", current.name(), e))
            }
        };

        if let Err(e) = candidate.rename_to(&current).await {
            error!("Failed to move {} into place: {}", candidate.name(), e);
            let restored = self.restore_backup().await;
            discard(&candidate.delete().await, "candidate");
            return StepOutcome::Fatal(OpsError::Mutation(format!(
                "failed to replace {}: {}{}",
                current.name(),
                e,
                if restored { "; previous descriptor restored" } else { "" }
            )));
        }

        info!("Installed new {}", current.name());
        match backup_warning {
            Some(message) => StepOutcome::Warning(message),
            None => StepOutcome::Success,
        }
    }

    async fn restart(&self) -> StepOutcome {
        if self.launch_and_settle().await {
            info!("Stack restarted on the new descriptor");
            return StepOutcome::Success;
        }

        error!("Stack did not stay up on the new descriptor");
        let detail = if self.restore_backup().await {
            if self.launch_and_settle().await {
                "rolled back, previous descriptor is running"
            } else {
                "rolled back, but the previous descriptor did not start either"
            }
        } else {
            "no backup to roll back to"
        };

        // A rollback that starts cleanly still fails the run
        StepOutcome::Fatal(OpsError::Mutation(format!("restart failed; {}", detail)))
    }

    async fn cleanup(&self) -> StepOutcome {
        match self.layout.backup_file().delete().await {
            Ok(()) => StepOutcome::Success,
            Err(e) => StepOutcome::Warning(format!("failed to remove backup: {}", e)),
        }
    }

    async fn commit(&mut self) -> StepOutcome {
        let current = self.layout.descriptor_file();
        let contents = match current.read_string().await {
            Ok(contents) => contents,
            Err(e) => return StepOutcome::Fatal(e),
        };
        self.version = descriptor::version_token(&contents);
        let message = descriptor::commit_message(
            &self.layout.descriptor_name,
            self.version.as_deref(),
            &self.options.upstream_url,
        );

        let vcs = self.deps.vcs;
        match vcs.has_changes(current.path()).await {
            Ok(true) => {}
            Ok(false) => {
                info!("{} already committed, nothing to record", current.name());
                return StepOutcome::Success;
            }
            Err(e) => return StepOutcome::Fatal(e),
        }
        if let Err(e) = vcs.add(current.path()).await {
            return StepOutcome::Fatal(e);
        }
        if let Err(e) = vcs.commit(current.path(), &message).await {
            return StepOutcome::Fatal(e);
        }
        info!("Committed: {}", message);

        if vcs.has_upstream().await {
            if let Err(e) = vcs.push().await {
                return StepOutcome::Warning(format!("failed to push: {}", e));
            }
            info!("Pushed descriptor update");
        }
        StepOutcome::Success
    }

    async fn launch_and_settle(&self) -> bool {
        let mut task = match self.deps.launcher.launch().await {
            Ok(task) => task,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };
        (self.sleep_fn)(self.options.settle_time).await;
        task.is_alive()
    }

    /// Put the backup back over the descriptor, consuming it
    async fn restore_backup(&self) -> bool {
        let backup = self.layout.backup_file();
        if !backup.exists().await {
            warn!("No backup available to restore");
            return false;
        }

        let current = self.layout.descriptor_file();
        match backup.copy_to(&current).await {
            Ok(()) => {
                info!("Restored {} from {}", current.name(), backup.name());
                discard(&backup.delete().await, "backup");
                true
            }
            Err(e) => {
                error!("Failed to restore {} from backup: {}", current.name(), e);
                false
            }
        }
    }
}

fn discard(result: &Result<(), OpsError>, what: &str) {
    if let Err(e) = result {
        warn!("Failed to remove {} file: {}", what, e);
    }
}
