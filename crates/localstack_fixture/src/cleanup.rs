//! Sweeping up containers left behind by aborted test runs.
//!
//! Fixture containers are created with auto-remove, but a test process that
//! is killed between create and stop leaves its container running. These
//! helpers find such containers by name prefix and age and force-remove them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::runtime::ContainerRuntime;

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;

/// Force-remove containers named `<prefix>...` that are older than `min_age`.
///
/// Containers whose creation time the runtime does not report are left
/// alone. A failed removal is logged and does not stop the sweep.
///
/// Returns the names of the removed containers.
pub async fn remove_orphaned_containers(
    runtime: &dyn ContainerRuntime,
    prefix: &str,
    min_age: Duration,
) -> Result<Vec<String>> {
    let cutoff = chrono::Duration::from_std(min_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let containers = runtime
        .list_containers(prefix)
        .await
        .map_err(Error::ContainerList)?;

    let mut removed = Vec::new();
    for container in containers {
        let Some(created) = container.created else {
            continue;
        };
        if created > cutoff {
            continue;
        }

        match runtime.remove_container(&container.id).await {
            Ok(()) => {
                info!(container = %container.name, "Removed orphaned container");
                removed.push(container.name);
            }
            Err(e) => {
                warn!(
                    container = %container.name,
                    error = %e,
                    "Failed to remove orphaned container"
                );
            }
        }
    }

    Ok(removed)
}
