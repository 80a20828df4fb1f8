//! Fakes for the external collaborators

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use stackop::deploy::compose::ContainerEngine;
use stackop::deploy::git::VersionControl;
use stackop::deploy::launcher::{Launched, Launcher};
use stackop::errors::OpsError;
use stackop::filesys::file::File;
use stackop::http::client::DescriptorFetcher;
use stackop::storage::layout::StorageLayout;

pub const OLD_DESCRIPTOR: &str =
    "services:\n  app:\n    image: ghcr.io/acme/app:v1.0.0\n    restart: always\n";
pub const NEW_DESCRIPTOR: &str =
    "services:\n  app:\n    image: ghcr.io/acme/app:v2.0.0\n    restart: always\n";
pub const UPSTREAM_URL: &str = "https://example.com/releases/latest/download/docker-compose.yml";

/// Working directory with a descriptor, plus a layout pointing into it
pub fn workspace(descriptor: Option<&str>) -> (tempfile::TempDir, StorageLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path()).with_log_dir(dir.path().join("logs"));
    if let Some(contents) = descriptor {
        std::fs::write(layout.descriptor_file().path(), contents).unwrap();
    }
    (dir, layout)
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// =============================== ENGINE ================================== //

#[derive(Default)]
pub struct FakeEngine {
    /// Probes answered "not ready" before the runtime comes up; `None` never
    pub ready_after: Option<usize>,
    /// Time each probe takes to answer
    pub probe_delay: Option<Duration>,
    pub fail_up: bool,
    pub fail_down: bool,
    pub running: Vec<String>,
    /// Cancel this token once this many health checks happened
    pub cancel_after_checks: Option<(usize, CancellationToken)>,
    /// Delete this file when `down` runs
    pub remove_on_down: Option<PathBuf>,

    pub probes: AtomicUsize,
    pub ups: AtomicUsize,
    pub downs: AtomicUsize,
    pub health_checks: AtomicUsize,
}

impl FakeEngine {
    pub fn ready() -> Self {
        Self {
            ready_after: Some(0),
            running: vec!["app".to_string()],
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn is_ready(&self) -> bool {
        let probe = self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        matches!(self.ready_after, Some(n) if probe >= n)
    }

    async fn up(&self) -> Result<(), OpsError> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        if self.fail_up {
            return Err(OpsError::CommandError("up failed".to_string()));
        }
        Ok(())
    }

    async fn down(&self) -> Result<(), OpsError> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        if let Some(path) = &self.remove_on_down {
            let _ = std::fs::remove_file(path);
        }
        if self.fail_down {
            return Err(OpsError::CommandError("down failed".to_string()));
        }
        Ok(())
    }

    async fn running_services(&self) -> Result<Vec<String>, OpsError> {
        let checks = self.health_checks.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after_checks {
            if checks >= *limit {
                token.cancel();
            }
        }
        Ok(self.running.clone())
    }
}

// ================================ GIT ==================================== //

pub struct FakeVcs {
    pub work_tree: bool,
    pub changes: bool,
    pub upstream: bool,
    pub fail_commit: bool,
    pub fail_push: bool,

    pub commits: Mutex<Vec<String>>,
    pub adds: AtomicUsize,
    pub pushes: AtomicUsize,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self {
            work_tree: true,
            changes: true,
            upstream: false,
            fail_commit: false,
            fail_push: false,
            commits: Mutex::new(Vec::new()),
            adds: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
        }
    }
}

impl FakeVcs {
    pub fn commit_messages(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn is_work_tree(&self) -> bool {
        self.work_tree
    }

    async fn has_changes(&self, _path: &Path) -> Result<bool, OpsError> {
        Ok(self.changes)
    }

    async fn add(&self, _path: &Path) -> Result<(), OpsError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self, _path: &Path, message: &str) -> Result<(), OpsError> {
        if self.fail_commit {
            return Err(OpsError::VcsError("commit failed".to_string()));
        }
        self.commits.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn has_upstream(&self) -> bool {
        self.upstream
    }

    async fn push(&self) -> Result<(), OpsError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_push {
            return Err(OpsError::VcsError("push rejected".to_string()));
        }
        Ok(())
    }
}

// =============================== FETCH =================================== //

pub struct FakeFetcher {
    /// Body served; `None` fails the download
    pub body: Option<String>,
    pub downloads: AtomicUsize,
}

impl FakeFetcher {
    pub fn serving(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            downloads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DescriptorFetcher for FakeFetcher {
    async fn download(&self, _url: &str, dest: &File) -> Result<u64, OpsError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => {
                dest.write_bytes(body.as_bytes()).await?;
                Ok(body.len() as u64)
            }
            None => Err(OpsError::FetchError("503 Service Unavailable".to_string())),
        }
    }
}

// ============================== LAUNCH =================================== //

pub struct FakeTask(bool);

impl Launched for FakeTask {
    fn is_alive(&mut self) -> bool {
        self.0
    }
}

/// Launcher whose tasks are alive or dead in the given order (alive once exhausted)
pub struct FakeLauncher {
    outcomes: Mutex<VecDeque<bool>>,
    descriptor: PathBuf,
    /// Descriptor contents at each launch
    pub launched_with: Mutex<Vec<String>>,
}

impl FakeLauncher {
    pub fn new(layout: &StorageLayout, outcomes: &[bool]) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            descriptor: layout.descriptor_file().path().to_path_buf(),
            launched_with: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> Vec<String> {
        self.launched_with.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn Launched>, OpsError> {
        let contents = std::fs::read_to_string(&self.descriptor).unwrap_or_default();
        self.launched_with.lock().unwrap().push(contents);
        let alive = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        Ok(Box::new(FakeTask(alive)))
    }
}
