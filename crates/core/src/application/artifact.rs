// Artifact Retrieval Protocol
//
// The runtime exports a file as a tar stream. We drain it fully, then parse
// the archive and pull out the one entry we asked for.

use futures::TryStreamExt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::constants::MAX_ARCHIVE_BYTES;
use crate::domain::JobError;
use crate::port::{ContainerRuntime, EnvironmentHandle, RuntimeError};

/// Pulls a single named file out of an environment
pub struct ArtifactRetriever {
    runtime: Arc<dyn ContainerRuntime>,
    max_archive_bytes: usize,
}

impl ArtifactRetriever {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            max_archive_bytes: MAX_ARCHIVE_BYTES,
        }
    }

    pub fn with_max_archive_bytes(mut self, max: usize) -> Self {
        self.max_archive_bytes = max;
        self
    }

    /// Retrieve the contents of `absolute_path` from the environment.
    ///
    /// # Errors
    /// - JobError::ArtifactMissing if the path does not exist or the archive
    ///   has no matching regular-file entry
    /// - JobError::Transport if the stream fails, is empty, oversized,
    ///   truncated or malformed
    pub async fn retrieve(
        &self,
        handle: &EnvironmentHandle,
        absolute_path: &str,
    ) -> Result<Vec<u8>, JobError> {
        let archive = self.drain(handle, absolute_path).await?;

        debug!(
            container_id = %handle,
            path = %absolute_path,
            archive_bytes = archive.len(),
            "Archive stream drained"
        );

        extract_entry(&archive, absolute_path)
    }

    async fn drain(
        &self,
        handle: &EnvironmentHandle,
        absolute_path: &str,
    ) -> Result<Vec<u8>, JobError> {
        let mut stream = self.runtime.download_archive(handle, absolute_path);
        let mut buf = Vec::new();

        while let Some(chunk) = stream.try_next().await.map_err(|e| match e {
            RuntimeError::PathNotFound(_) => JobError::ArtifactMissing {
                path: absolute_path.to_string(),
            },
            other => {
                warn!(container_id = %handle, error = %other, "Archive stream failed");
                JobError::Transport(other.to_string())
            }
        })? {
            if buf.len() + chunk.len() > self.max_archive_bytes {
                return Err(JobError::Transport(format!(
                    "archive exceeds {} bytes",
                    self.max_archive_bytes
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        if buf.is_empty() {
            return Err(JobError::Transport("empty archive stream".to_string()));
        }
        Ok(buf)
    }
}

/// Locate the regular-file entry for `absolute_path` in a tar archive.
///
/// Runtimes name the entry after the basename of the exported path; the full
/// relative path (with or without a leading `./`) is accepted too.
pub fn extract_entry(archive: &[u8], absolute_path: &str) -> Result<Vec<u8>, JobError> {
    let wanted = Path::new(absolute_path.trim_start_matches('/'));
    let basename = wanted.file_name().ok_or_else(|| JobError::ArtifactMissing {
        path: absolute_path.to_string(),
    })?;

    let malformed = |e: std::io::Error| JobError::Transport(format!("malformed archive: {}", e));

    let mut tar = tar::Archive::new(archive);
    for entry in tar.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(malformed)?.into_owned();
        let path = path.strip_prefix("./").unwrap_or(&path);
        if path != Path::new(basename) && path != wanted {
            continue;
        }

        let expected = entry.size();
        let mut data = Vec::with_capacity(expected.min(MAX_ARCHIVE_BYTES as u64) as usize);
        entry.read_to_end(&mut data).map_err(malformed)?;

        if data.len() as u64 != expected {
            return Err(JobError::Transport(format!(
                "truncated archive: entry holds {} of {} bytes",
                data.len(),
                expected
            )));
        }
        return Ok(data);
    }

    Err(JobError::ArtifactMissing {
        path: absolute_path.to_string(),
    })
}
