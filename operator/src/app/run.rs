//! Resident supervisor: launch the stack, idle, shut down on signal

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::options::SupervisorOptions;
use crate::deploy::compose::ContainerEngine;
use crate::deploy::readiness::wait_for_runtime;
use crate::deploy::stop::stop_stack;
use crate::errors::OpsError;
use crate::storage::layout::StorageLayout;

/// Run the supervisor until `shutdown` is cancelled.
///
/// Returns an error only when the stack could not be started. Once shutdown
/// is requested the stack is stopped and the run counts as handled whatever
/// the stop outcome.
pub async fn run<E, S, F>(
    engine: &E,
    layout: &StorageLayout,
    options: &SupervisorOptions,
    shutdown: CancellationToken,
    sleep_fn: S,
) -> Result<(), OpsError>
where
    E: ContainerEngine + ?Sized,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let descriptor = layout.descriptor_file();
    if !descriptor.exists().await {
        error!("{} not found in {}", descriptor.name(), layout.work_dir.display());
        return Err(OpsError::Precondition(format!(
            "{} not found",
            descriptor.path().display()
        )));
    }

    let cleanup = Cleanup { engine, layout };

    let started = tokio::select! {
        _ = shutdown.cancelled() => None,
        started = start_stack(engine, options, &sleep_fn) => Some(started),
    };
    match started {
        Some(result) => result?,
        None => {
            info!("Shutdown requested before the stack was up");
            cleanup.run().await;
            return Ok(());
        }
    }

    info!(
        "Stack is up, supervising (health check every {:?})",
        options.health_interval
    );
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown signal received, shutting down...");
                break;
            }
            _ = sleep_fn(options.health_interval) => {
                check_health(engine).await;
            }
        }
    }

    cleanup.run().await;
    Ok(())
}

async fn start_stack<E, S, F>(
    engine: &E,
    options: &SupervisorOptions,
    sleep_fn: &S,
) -> Result<(), OpsError>
where
    E: ContainerEngine + ?Sized,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    wait_for_runtime(engine, &options.readiness, sleep_fn).await?;
    engine
        .up()
        .await
        .inspect_err(|e| error!("Failed to start stack: {}", e))?;
    info!("Stack started");
    Ok(())
}

async fn check_health<E>(engine: &E)
where
    E: ContainerEngine + ?Sized,
{
    match engine.running_services().await {
        Ok(services) if services.is_empty() => {
            warn!("No services are running");
        }
        Ok(services) => {
            debug!("Running services: {}", services.join(", "));
        }
        Err(e) => {
            warn!("Health check failed: {}", e);
        }
    }
}

/// Shutdown work; consumed by `run`, so it happens at most once
struct Cleanup<'a, E: ?Sized> {
    engine: &'a E,
    layout: &'a StorageLayout,
}

impl<E> Cleanup<'_, E>
where
    E: ContainerEngine + ?Sized,
{
    async fn run(self) {
        match stop_stack(self.engine, self.layout).await {
            Ok(()) => info!("Shutdown complete"),
            Err(e) => error!("Stack stop during shutdown failed: {}", e),
        }
    }
}

/// Cancel `token` on the first SIGTERM or SIGINT.
///
/// The handlers stay registered after the first signal, so signals arriving
/// while the cleanup runs are absorbed instead of killing the process.
pub fn cancel_on_signal(token: CancellationToken) -> Result<JoinHandle<()>, OpsError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down...");
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, shutting down...");
                }
                _ = token.cancelled() => return,
            }
            token.cancel();
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl+C: {}", e);
                        return;
                    }
                    info!("Ctrl+C received, shutting down...");
                }
                _ = token.cancelled() => return,
            }
            token.cancel();
        }))
    }
}
