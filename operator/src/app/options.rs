//! Procedure options

use std::time::Duration;

use crate::storage::settings::Settings;

/// Options for waiting on the container runtime
#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Delay between probes
    pub interval: Duration,

    /// Total waiting budget before giving up
    pub timeout: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Options for the resident supervisor
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub readiness: ReadinessOptions,

    /// Interval between running-service checks while idle
    pub health_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            readiness: ReadinessOptions::default(),
            health_interval: Duration::from_secs(30),
        }
    }
}

/// Options for the self-update procedure
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Upstream release asset URL
    pub upstream_url: String,

    /// Wait after a restart before the liveness check
    pub settle_time: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            upstream_url: crate::storage::settings::DEFAULT_UPSTREAM_URL.to_string(),
            settle_time: Duration::from_secs(10),
        }
    }
}

impl From<&Settings> for SupervisorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            readiness: ReadinessOptions {
                interval: Duration::from_secs(settings.probe_interval_secs),
                timeout: Duration::from_secs(settings.probe_timeout_secs),
            },
            health_interval: Duration::from_secs(settings.health_interval_secs),
        }
    }
}

impl From<&Settings> for UpdateOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            upstream_url: settings.upstream_url.clone(),
            settle_time: Duration::from_secs(settings.settle_secs),
        }
    }
}
