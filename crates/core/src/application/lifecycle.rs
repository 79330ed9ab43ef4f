// Container Lifecycle Manager
// Creates, starts and supervises one ephemeral environment per job

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::cancel::CancelToken;
use crate::application::constants::{LABEL_JOB_ID, LABEL_MANAGED};
use crate::domain::{JobError, JobRequest};
use crate::port::{ContainerRuntime, EnvironmentHandle, LaunchSpec, ResourceLimits, RuntimeError};

/// Runtime reachability, as reported by the liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHealth {
    pub reachable: bool,
    pub detail: Option<String>,
}

pub struct LifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
    limits: ResourceLimits,
}

impl LifecycleManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        image: impl Into<String>,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            runtime,
            image: image.into(),
            limits,
        }
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Build the launch spec for one job
    pub fn launch_spec(&self, job_id: &str, request: &JobRequest) -> LaunchSpec {
        LaunchSpec {
            image: self.image.clone(),
            env: request.worker_env(),
            limits: self.limits.clone(),
            labels: BTreeMap::from([
                (LABEL_MANAGED.to_string(), "true".to_string()),
                (LABEL_JOB_ID.to_string(), job_id.to_string()),
            ]),
        }
    }

    /// Create and start an isolated environment for the job.
    ///
    /// # Errors
    /// - JobError::ImageNotFound naming the configured image
    /// - JobError::Transport for any other runtime failure
    pub async fn launch(
        &self,
        job_id: &str,
        request: &JobRequest,
    ) -> Result<EnvironmentHandle, JobError> {
        let spec = self.launch_spec(job_id, request);

        info!(
            job_id = %job_id,
            image = %self.image,
            memory_bytes = self.limits.memory_bytes,
            network_disabled = self.limits.network_disabled,
            "Launching worker environment"
        );

        match self.runtime.launch(&spec).await {
            Ok(handle) => {
                info!(job_id = %job_id, container_id = %handle, "Worker environment started");
                Ok(handle)
            }
            Err(RuntimeError::ImageNotFound(_)) => {
                error!(job_id = %job_id, image = %self.image, "Worker image not found");
                Err(JobError::ImageNotFound {
                    image: self.image.clone(),
                })
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Worker launch failed");
                Err(JobError::Transport(e.to_string()))
            }
        }
    }

    /// Block until the environment exits and return its status.
    ///
    /// A non-zero status is returned as a value. With `deadline` set the wait
    /// gives up with `Timeout`; a fired `cancel` token gives `Cancelled`.
    /// Neither removes the environment; that is the cleanup guard's job.
    pub async fn wait(
        &self,
        handle: &EnvironmentHandle,
        deadline: Option<Duration>,
        mut cancel: CancelToken,
    ) -> Result<i64, JobError> {
        let result = tokio::select! {
            res = self.wait_with_deadline(handle, deadline) => res,
            _ = cancel.cancelled() => Err(JobError::Cancelled),
        };

        match &result {
            Ok(code) => info!(container_id = %handle, exit_code = code, "Worker exited"),
            Err(e) => warn!(container_id = %handle, error = %e, kind = e.kind(), "Wait aborted"),
        }
        result
    }

    async fn wait_with_deadline(
        &self,
        handle: &EnvironmentHandle,
        deadline: Option<Duration>,
    ) -> Result<i64, JobError> {
        let status = match deadline {
            Some(limit) => tokio::time::timeout(limit, self.runtime.wait(handle))
                .await
                .map_err(|_| JobError::Timeout {
                    after_ms: limit.as_millis() as u64,
                })?,
            None => self.runtime.wait(handle).await,
        };
        status.map_err(|e| JobError::Transport(e.to_string()))
    }

    /// Liveness probe: can the runtime control channel be reached?
    pub async fn probe(&self) -> RuntimeHealth {
        match self.runtime.ping().await {
            Ok(()) => RuntimeHealth {
                reachable: true,
                detail: None,
            },
            Err(e) => RuntimeHealth {
                reachable: false,
                detail: Some(e.to_string()),
            },
        }
    }

    /// Startup self-check for the worker image
    pub async fn image_available(&self) -> Result<bool, RuntimeError> {
        self.runtime.image_exists(&self.image).await
    }
}
