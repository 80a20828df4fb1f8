//! Stack teardown

use tracing::{error, info};

use crate::deploy::compose::ContainerEngine;
use crate::errors::OpsError;
use crate::storage::layout::StorageLayout;

/// Tear the stack down. A pass-through of the engine result: no retry, no rollback.
pub async fn stop_stack<E>(engine: &E, layout: &StorageLayout) -> Result<(), OpsError>
where
    E: ContainerEngine + ?Sized,
{
    let descriptor = layout.descriptor_file();
    if !descriptor.exists().await {
        error!("{} not found in {}", descriptor.name(), layout.work_dir.display());
        return Err(OpsError::Precondition(format!(
            "{} not found",
            descriptor.path().display()
        )));
    }

    match engine.down().await {
        Ok(()) => {
            info!("Stack stopped");
            Ok(())
        }
        Err(e) => {
            error!("Failed to stop stack: {}", e);
            Err(e)
        }
    }
}
