//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Default deployment descriptor file name
pub const DEFAULT_DESCRIPTOR_NAME: &str = "docker-compose.yml";

/// Settings file looked up in the working directory
pub const SETTINGS_FILE_NAME: &str = ".stackop.json";

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "stackop.log";

const BACKUP_SUFFIX: &str = ".backup";
const CANDIDATE_SUFFIX: &str = ".new";

/// Storage layout for the operator
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Working directory holding the deployment descriptor
    pub work_dir: PathBuf,

    /// Per-user log directory
    pub log_dir: PathBuf,

    /// Deployment descriptor file name
    pub descriptor_name: String,
}

impl StorageLayout {
    /// Create a new storage layout rooted at a working directory
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            log_dir: default_log_dir(),
            descriptor_name: DEFAULT_DESCRIPTOR_NAME.to_string(),
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_descriptor_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor_name = name.into();
        self
    }

    /// Get the working directory
    pub fn work_dir(&self) -> Dir {
        Dir::new(&self.work_dir)
    }

    /// Get the deployment descriptor
    pub fn descriptor_file(&self) -> File {
        self.work_dir().file(&self.descriptor_name)
    }

    /// Get the single backup generation of the descriptor
    pub fn backup_file(&self) -> File {
        self.work_dir()
            .file(&format!("{}{}", self.descriptor_name, BACKUP_SUFFIX))
    }

    /// Get the hidden candidate file the upstream descriptor is downloaded to
    pub fn candidate_file(&self) -> File {
        self.work_dir()
            .file(&format!(".{}{}", self.descriptor_name, CANDIDATE_SUFFIX))
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        self.work_dir().file(SETTINGS_FILE_NAME)
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(&self.log_dir)
    }

    /// Get the log file path
    pub fn log_file(&self) -> File {
        self.logs_dir().file(LOG_FILE_NAME)
    }
}

/// `$HOME/.stackop/logs`, or a relative `.stackop/logs` when no home is known
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stackop")
        .join("logs")
}
