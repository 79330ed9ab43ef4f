// Container Runtime Port
// Abstraction over the engine that hosts one ephemeral worker per job

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::application::constants::{DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_PIDS_LIMIT};

/// Opaque handle to one execution environment (container id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle(String);

impl EnvironmentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Isolation applied to every environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub pids_limit: Option<i64>,
    pub network_disabled: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            pids_limit: Some(DEFAULT_PIDS_LIMIT),
            network_disabled: true,
        }
    }
}

/// Everything needed to create and start one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub limits: ResourceLimits,
    pub labels: BTreeMap<String, String>,
}

/// Tar-formatted byte stream of a path inside an environment
pub type ArchiveStream<'a> = BoxStream<'a, Result<Bytes, RuntimeError>>;

/// Runtime errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Path not found in environment: {0}")]
    PathNotFound(String),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Runtime API error: {0}")]
    Api(String),

    #[error("Runtime unreachable: {0}")]
    Unreachable(String),
}

/// Container Runtime trait
///
/// Implementations:
/// - DockerRuntime: Docker Engine API (qrgen-infra-docker)
/// - MockContainerRuntime: in-memory, for tests
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start an environment.
    ///
    /// # Errors
    /// - RuntimeError::ImageNotFound if the image cannot be resolved
    ///
    /// If creation succeeds but start fails, the implementation removes the
    /// created environment before returning the error.
    async fn launch(&self, spec: &LaunchSpec) -> Result<EnvironmentHandle, RuntimeError>;

    /// Block until the environment terminates and return its exit status.
    /// A non-zero status is a value, not an error.
    async fn wait(&self, handle: &EnvironmentHandle) -> Result<i64, RuntimeError>;

    /// Stream `path` out of the environment's filesystem as a tar archive
    fn download_archive<'a>(
        &'a self,
        handle: &'a EnvironmentHandle,
        path: &str,
    ) -> ArchiveStream<'a>;

    /// Forcefully remove the environment, running or not
    async fn remove(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError>;

    /// Check the control channel
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Whether `image` is present locally
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{env_keys, PNG_MAGIC};
    use futures::stream::{self, StreamExt};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Chunk size used when streaming mock archives
    const CHUNK_SIZE: usize = 512;

    /// Mock worker behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Exit 0 and write PNG magic followed by the target
        Render,
        /// Image cannot be resolved; nothing is created
        ImageMissing,
        /// Exit with the given status
        Exit(i64),
        /// Exit 0 without writing the artifact (runtime reports the path absent)
        NoArtifact,
        /// Exit 0 but the archive holds some other file
        WrongEntry,
        /// Archive stream is cut in the middle of the entry
        TruncatedArchive,
        /// Archive stream fails with the given message
        StreamError(String),
        /// Worker never exits on its own
        Hang,
        /// Retrieval panics (fault isolation testing)
        PanicOnRetrieve,
    }

    #[derive(Default)]
    struct MockState {
        next_id: u64,
        live: HashMap<String, BTreeMap<String, String>>,
        launched: usize,
        remove_calls: usize,
        last_spec: Option<LaunchSpec>,
    }

    /// In-memory container runtime that tracks live environments
    pub struct MockContainerRuntime {
        behavior: Mutex<MockBehavior>,
        state: Mutex<MockState>,
        remove_fails: AtomicBool,
        reachable: AtomicBool,
        launch_delay: Mutex<Duration>,
        remove_delay: Mutex<Duration>,
    }

    impl MockContainerRuntime {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                state: Mutex::new(MockState::default()),
                remove_fails: AtomicBool::new(false),
                reachable: AtomicBool::new(true),
                launch_delay: Mutex::new(Duration::ZERO),
                remove_delay: Mutex::new(Duration::ZERO),
            }
        }

        pub fn new_rendering() -> Self {
            Self::new(MockBehavior::Render)
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        /// Make `remove` fail (environment stays live)
        pub fn set_remove_fails(&self, fails: bool) {
            self.remove_fails.store(fails, Ordering::SeqCst);
        }

        pub fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        /// Pause between "create" and "start" (the environment already exists)
        pub fn set_launch_delay(&self, delay: Duration) {
            *self.launch_delay.lock().unwrap() = delay;
        }

        /// Pause before a removal takes effect
        pub fn set_remove_delay(&self, delay: Duration) {
            *self.remove_delay.lock().unwrap() = delay;
        }

        /// Environments created and not yet removed
        pub fn live_count(&self) -> usize {
            self.state.lock().unwrap().live.len()
        }

        /// Environments ever created
        pub fn launched_count(&self) -> usize {
            self.state.lock().unwrap().launched
        }

        pub fn remove_calls(&self) -> usize {
            self.state.lock().unwrap().remove_calls
        }

        pub fn last_spec(&self) -> Option<LaunchSpec> {
            self.state.lock().unwrap().last_spec.clone()
        }

        fn behavior(&self) -> MockBehavior {
            self.behavior.lock().unwrap().clone()
        }

        fn is_live(&self, id: &str) -> bool {
            self.state.lock().unwrap().live.contains_key(id)
        }

        fn env_of(&self, handle: &EnvironmentHandle) -> Option<BTreeMap<String, String>> {
            self.state.lock().unwrap().live.get(handle.id()).cloned()
        }
    }

    /// Build a single-entry tar archive, the way a runtime exports one file
    pub fn tar_with_entry(name: &str, data: &[u8]) -> Vec<u8> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);

        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_data(&mut header, name, data)
            .expect("in-memory tar append");
        builder.into_inner().expect("in-memory tar finish")
    }

    /// What the mock worker "renders" for a target
    pub fn rendered_bytes(target: &str) -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(target.as_bytes());
        bytes
    }

    fn chunked(archive: Vec<u8>) -> Vec<Result<Bytes, RuntimeError>> {
        archive
            .chunks(CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    fn basename(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }

    #[async_trait]
    impl ContainerRuntime for MockContainerRuntime {
        async fn launch(&self, spec: &LaunchSpec) -> Result<EnvironmentHandle, RuntimeError> {
            if let MockBehavior::ImageMissing = self.behavior() {
                return Err(RuntimeError::ImageNotFound(spec.image.clone()));
            }

            let id = {
                let mut state = self.state.lock().unwrap();
                state.next_id += 1;
                let id = format!("mock-{}", state.next_id);
                state.live.insert(id.clone(), spec.env.clone());
                state.launched += 1;
                state.last_spec = Some(spec.clone());
                id
            };

            let delay = *self.launch_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(EnvironmentHandle::new(id))
        }

        async fn wait(&self, handle: &EnvironmentHandle) -> Result<i64, RuntimeError> {
            match self.behavior() {
                MockBehavior::Exit(code) => Ok(code),
                MockBehavior::Hang => loop {
                    // Returns once the environment is force-removed underneath us
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    if !self.is_live(handle.id()) {
                        return Err(RuntimeError::EnvironmentNotFound(handle.to_string()));
                    }
                },
                _ => Ok(0),
            }
        }

        fn download_archive<'a>(
            &'a self,
            handle: &'a EnvironmentHandle,
            path: &str,
        ) -> ArchiveStream<'a> {
            let Some(env) = self.env_of(handle) else {
                return stream::iter(vec![Err(RuntimeError::EnvironmentNotFound(
                    handle.to_string(),
                ))])
                .boxed();
            };
            let target = env.get(env_keys::TARGET).cloned().unwrap_or_default();
            let name = basename(path);

            let items = match self.behavior() {
                MockBehavior::NoArtifact => vec![Err(RuntimeError::PathNotFound(path.to_string()))],
                MockBehavior::WrongEntry => {
                    chunked(tar_with_entry("stdout.log", b"rendered elsewhere"))
                }
                MockBehavior::TruncatedArchive => {
                    let payload = vec![0x42; 2048];
                    let mut archive = tar_with_entry(name, &payload);
                    archive.truncate(512 + 700);
                    chunked(archive)
                }
                MockBehavior::StreamError(msg) => {
                    let mut items = chunked(tar_with_entry(name, &rendered_bytes(&target)));
                    items.truncate(1);
                    items.push(Err(RuntimeError::Api(msg)));
                    items
                }
                MockBehavior::PanicOnRetrieve => panic!("mock runtime: archive export crashed"),
                _ => chunked(tar_with_entry(name, &rendered_bytes(&target))),
            };

            stream::iter(items).boxed()
        }

        async fn remove(&self, handle: &EnvironmentHandle) -> Result<(), RuntimeError> {
            let delay = *self.remove_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.lock().unwrap();
            state.remove_calls += 1;
            if self.remove_fails.load(Ordering::SeqCst) {
                return Err(RuntimeError::Api("removal refused".to_string()));
            }
            state
                .live
                .remove(handle.id())
                .map(|_| ())
                .ok_or_else(|| RuntimeError::EnvironmentNotFound(handle.to_string()))
        }

        async fn ping(&self) -> Result<(), RuntimeError> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RuntimeError::Unreachable("mock runtime offline".to_string()))
            }
        }

        async fn image_exists(&self, _image: &str) -> Result<bool, RuntimeError> {
            Ok(!matches!(self.behavior(), MockBehavior::ImageMissing))
        }
    }
}
