// Docker runtime implementation
// reason: bollard speaks the Engine API over the local socket (or DOCKER_HOST)
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, info, warn};

use qrgen_core::port::{
    ArchiveStream, ContainerRuntime, EnvironmentHandle, LaunchSpec, RuntimeError,
};

/// Docker Engine backed container runtime
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using the platform defaults (unix socket, or `DOCKER_HOST`)
    ///
    /// Connecting is lazy: an unreachable engine surfaces on the first call,
    /// so pair this with `ping` for a startup check.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))?;
        Ok(Self::new(docker))
    }

    /// Translate a launch spec into an Engine create-container body
    fn container_config(spec: &LaunchSpec) -> Config<String> {
        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let host_config = HostConfig {
            memory: Some(spec.limits.memory_bytes),
            // Same value as memory: no swap on top of the limit
            memory_swap: Some(spec.limits.memory_bytes),
            pids_limit: spec.limits.pids_limit,
            network_mode: spec.limits.network_disabled.then(|| "none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            labels: Some(labels),
            network_disabled: Some(spec.limits.network_disabled),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn force_remove(&self, id: &str) -> Result<(), BollardError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
    }

    /// Exit code from inspect, for a wait stream that closed without a status
    async fn inspect_exit_code(&self, id: &str) -> Result<i64, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| classify(e, id))?;

        inspect
            .state
            .and_then(|s| s.exit_code)
            .ok_or_else(|| RuntimeError::Api(format!("no exit status for container {}", id)))
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Map a bollard error to a runtime error, with `subject` naming what was addressed
fn classify(err: BollardError, subject: &str) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::EnvironmentNotFound(subject.to_string()),
        BollardError::IOError { .. }
        | BollardError::SocketNotFoundError(_)
        | BollardError::RequestTimeoutError => RuntimeError::Unreachable(err.to_string()),
        other => RuntimeError::Api(other.to_string()),
    }
}

/// The wait endpoint reports a non-zero exit as an error; fold it back into a status
fn wait_status(result: Result<i64, BollardError>, id: &str) -> Result<i64, RuntimeError> {
    match result {
        Ok(code) => Ok(code),
        Err(BollardError::DockerContainerWaitError { code, .. }) => Ok(code),
        Err(e) => Err(classify(e, id)),
    }
}

/// Start a created container. A container that fails to start is removed
/// before the start error is returned, so no caller ever owns it.
async fn start_or_discard<S, R, RFut>(id: &str, start: S, remove: R) -> Result<(), RuntimeError>
where
    S: Future<Output = Result<(), BollardError>>,
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<(), BollardError>>,
{
    let Err(e) = start.await else {
        return Ok(());
    };

    warn!(container_id = %id, error = %e, "Start failed, removing created container");
    if let Err(rm) = remove().await {
        warn!(container_id = %id, error = %rm, "Removal after failed start also failed");
    }
    Err(classify(e, id))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<EnvironmentHandle, RuntimeError> {
        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, Self::container_config(spec))
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RuntimeError::ImageNotFound(spec.image.clone())
                } else {
                    classify(e, &spec.image)
                }
            })?;

        for warning in &created.warnings {
            warn!(container_id = %created.id, warning = %warning, "Engine warning on create");
        }

        start_or_discard(
            &created.id,
            self.docker
                .start_container(&created.id, None::<StartContainerOptions<String>>),
            || self.force_remove(&created.id),
        )
        .await?;

        info!(container_id = %created.id, image = %spec.image, "Container started");
        Ok(EnvironmentHandle::new(created.id))
    }

    async fn wait(&self, handle: &EnvironmentHandle) -> Result<i64, RuntimeError> {
        let mut stream = self
            .docker
            .wait_container(handle.id(), None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(res) => wait_status(res.map(|r| r.status_code), handle.id()),
            None => {
                debug!(container_id = %handle, "Wait stream closed, inspecting container");
                self.inspect_exit_code(handle.id()).await
            }
        }
    }

    fn download_archive<'a>(
        &'a self,
        handle: &'a EnvironmentHandle,
        path: &str,
    ) -> ArchiveStream<'a> {
        let path = path.to_string();
        self.docker
            .download_from_container(
                handle.id(),
                Some(DownloadFromContainerOptions { path: path.clone() }),
            )
            .map_err(move |e| {
                if is_not_found(&e) {
                    RuntimeError::PathNotFound(path.clone())
                } else {
                    classify(e, &path)
                }
            })
            .boxed()
    }

    async fn remove(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError> {
        self.force_remove(handle.id())
            .await
            .map_err(|e| classify(e, handle.id()))
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(classify(e, image)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrgen_core::port::ResourceLimits;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec() -> LaunchSpec {
        LaunchSpec {
            image: "qrcode-worker:latest".to_string(),
            env: BTreeMap::from([
                ("URL_TO_GENERATE".to_string(), "https://example.com".to_string()),
                ("BOX_SIZE".to_string(), "10".to_string()),
            ]),
            limits: ResourceLimits::default(),
            labels: BTreeMap::from([("qrgen.managed".to_string(), "true".to_string())]),
        }
    }

    fn server_error(status_code: u16) -> BollardError {
        BollardError::DockerResponseServerError {
            status_code,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_config_applies_isolation() {
        let config = DockerRuntime::container_config(&spec());
        let host = config.host_config.unwrap();

        assert_eq!(host.memory, Some(128 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.pids_limit, Some(64));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
    }

    #[test]
    fn test_config_env_and_labels() {
        let config = DockerRuntime::container_config(&spec());
        let env = config.env.unwrap();

        assert!(env.contains(&"URL_TO_GENERATE=https://example.com".to_string()));
        assert!(env.contains(&"BOX_SIZE=10".to_string()));
        assert_eq!(config.labels.unwrap()["qrgen.managed"], "true");
    }

    #[test]
    fn test_network_left_alone_when_allowed() {
        let mut spec = spec();
        spec.limits.network_disabled = false;
        let config = DockerRuntime::container_config(&spec);

        assert_eq!(config.host_config.unwrap().network_mode, None);
        assert_eq!(config.network_disabled, Some(false));
    }

    #[test]
    fn test_non_zero_exit_is_a_status() {
        let err = BollardError::DockerContainerWaitError {
            error: String::new(),
            code: 3,
        };
        assert_eq!(wait_status(Err(err), "c1"), Ok(3));
        assert_eq!(wait_status(Ok(0), "c1"), Ok(0));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(server_error(404), "c1"),
            RuntimeError::EnvironmentNotFound("c1".to_string())
        );
        assert!(matches!(
            classify(server_error(500), "c1"),
            RuntimeError::Api(_)
        ));
        assert!(matches!(
            classify(BollardError::RequestTimeoutError, "c1"),
            RuntimeError::Unreachable(_)
        ));
        assert!(is_not_found(&server_error(404)));
        assert!(!is_not_found(&server_error(409)));
    }

    #[tokio::test]
    async fn test_failed_start_removes_container() {
        let removed = AtomicUsize::new(0);
        let counter = &removed;

        let err = start_or_discard(
            "c1",
            async { Err(server_error(500)) },
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RuntimeError::Api(_)));
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_start_reported_even_if_removal_fails() {
        let err = start_or_discard(
            "c1",
            async { Err(BollardError::RequestTimeoutError) },
            || async { Err(server_error(409)) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RuntimeError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_started_container_is_kept() {
        let removed = AtomicUsize::new(0);
        let counter = &removed;

        start_or_discard("c1", async { Ok(()) }, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    /// Needs a running Docker daemon
    #[tokio::test]
    #[ignore]
    async fn test_ping_local_daemon() {
        let runtime = DockerRuntime::connect().unwrap();
        tokio_test::assert_ok!(runtime.ping().await);
        assert!(!runtime
            .image_exists("qrgen-definitely-missing:none")
            .await
            .unwrap());
    }
}
