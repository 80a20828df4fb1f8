//! Wait for the container runtime to answer

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::options::ReadinessOptions;
use crate::deploy::compose::ContainerEngine;
use crate::errors::OpsError;

/// Probe the runtime until it is ready or the waiting budget is spent.
///
/// The budget is wall-clock time since the first probe. A probe gets at most
/// one interval, and never more than what is left of the budget, so a hung
/// runtime cannot stretch the wait past `options.timeout`.
pub async fn wait_for_runtime<E, S, F>(
    engine: &E,
    options: &ReadinessOptions,
    sleep_fn: S,
) -> Result<(), OpsError>
where
    E: ContainerEngine + ?Sized,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let deadline = started + options.timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let probe_budget = options.interval.min(remaining);
        let ready = match tokio::time::timeout(probe_budget, engine.is_ready()).await {
            Ok(ready) => ready,
            Err(_) => {
                warn!("Container runtime probe did not answer within {:?}", probe_budget);
                false
            }
        };
        if ready {
            info!("Container runtime is ready (waited {:?})", started.elapsed());
            return Ok(());
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            error!(
                "Container runtime not ready after {:?}, giving up",
                options.timeout
            );
            return Err(OpsError::Timeout(format!(
                "container runtime not ready after {}s",
                options.timeout.as_secs()
            )));
        }

        debug!(
            "Container runtime not ready, retrying in {:?} ({:?} left)",
            options.interval, remaining
        );
        sleep_fn(options.interval.min(remaining)).await;
    }
}
