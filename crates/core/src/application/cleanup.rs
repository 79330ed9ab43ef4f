// Cleanup Guarantor
//
// Scoped ownership of one execution environment. `release` removes it and
// reports failures beside the job outcome; dropping an unreleased guard
// schedules the removal on the current runtime instead.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::CleanupFailure;
use crate::port::{ContainerRuntime, EnvironmentHandle};

pub struct CleanupGuard {
    runtime: Arc<dyn ContainerRuntime>,
    handle: Option<EnvironmentHandle>,
    job_id: String,
}

impl CleanupGuard {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        handle: EnvironmentHandle,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            handle: Some(handle),
            job_id: job_id.into(),
        }
    }

    /// The guarded environment (present until released)
    pub fn handle(&self) -> Option<&EnvironmentHandle> {
        self.handle.as_ref()
    }

    /// Force-remove the environment. Consumes the guard, so removal is
    /// attempted exactly once.
    ///
    /// The guard keeps the handle until `remove` resolves: dropping this
    /// future mid-removal still leaves the `Drop` fallback armed.
    pub async fn release(mut self) -> Result<(), CleanupFailure> {
        let Some(handle) = self.handle.clone() else {
            return Ok(());
        };

        let removed = self.runtime.remove(&handle).await;
        self.handle = None;

        match removed {
            Ok(()) => {
                info!(job_id = %self.job_id, container_id = %handle, "Environment removed");
                Ok(())
            }
            Err(e) => {
                warn!(
                    job_id = %self.job_id,
                    container_id = %handle,
                    error = %e,
                    "Failed to remove environment (may require manual cleanup)"
                );
                Err(CleanupFailure {
                    environment: handle.to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        warn!(
            job_id = %self.job_id,
            container_id = %handle,
            "Job dropped before cleanup, scheduling forced removal"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let runtime = Arc::clone(&self.runtime);
                let job_id = std::mem::take(&mut self.job_id);
                rt.spawn(async move {
                    if let Err(e) = runtime.remove(&handle).await {
                        warn!(job_id = %job_id, container_id = %handle, error = %e, "Deferred removal failed");
                    }
                });
            }
            Err(_) => {
                error!(
                    job_id = %self.job_id,
                    container_id = %handle,
                    "No async runtime available, environment leaked"
                );
            }
        }
    }
}
