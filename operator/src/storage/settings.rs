//! Settings file management

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::OpsError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, DEFAULT_ROTATE_BYTES};
use crate::storage::layout::DEFAULT_DESCRIPTOR_NAME;

/// Release asset the descriptor is refreshed from
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://github.com/stackop/stack/releases/latest/download/docker-compose.yml";

/// Operator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Deployment descriptor file name in the working directory
    #[serde(default = "default_descriptor_name")]
    pub descriptor_name: String,

    /// Upstream release asset for `update`
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Delay between container runtime probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Total time to wait for the container runtime
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Interval of the supervisor health check
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Wait after a restart before checking the supervisor is alive
    #[serde(default = "default_settle")]
    pub settle_secs: u64,

    /// Rotate the log file past this size
    #[serde(default = "default_rotate_bytes")]
    pub log_rotate_bytes: u64,
}

fn default_descriptor_name() -> String {
    DEFAULT_DESCRIPTOR_NAME.to_string()
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_probe_interval() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    300
}

fn default_health_interval() -> u64 {
    30
}

fn default_settle() -> u64 {
    10
}

fn default_rotate_bytes() -> u64 {
    DEFAULT_ROTATE_BYTES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            descriptor_name: default_descriptor_name(),
            upstream_url: default_upstream_url(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
            health_interval_secs: default_health_interval(),
            settle_secs: default_settle(),
            log_rotate_bytes: default_rotate_bytes(),
        }
    }
}

impl Settings {
    /// Load settings from `file`, or the defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, OpsError> {
        if !file.exists().await {
            debug!("No settings file at {}, using defaults", file.path().display());
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the procedures cannot run with
    pub fn validate(&self) -> Result<(), OpsError> {
        let url = url::Url::parse(&self.upstream_url)
            .map_err(|e| OpsError::ConfigError(format!("upstream_url: {}", e)))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(OpsError::ConfigError(format!(
                "upstream_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.descriptor_name.is_empty() || self.descriptor_name.contains('/') {
            return Err(OpsError::ConfigError(format!(
                "descriptor_name must be a plain file name, got {:?}",
                self.descriptor_name
            )));
        }
        if self.probe_interval_secs == 0 || self.health_interval_secs == 0 {
            return Err(OpsError::ConfigError(
                "probe and health intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
