// Job outcome: artifact or a classified failure

use thiserror::Error;

use crate::domain::job::{JobId, JobState};

/// PNG file signature
pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Rendered image bytes, held in memory only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
    content_type: &'static str,
}

impl Artifact {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "image/png",
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_png(&self) -> bool {
        self.bytes.starts_with(&PNG_MAGIC)
    }
}

/// Failure kinds of a launched (or launching) job.
///
/// The distinct kinds drive logging; callers see one generic failure code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("worker image '{image}' not found; build it before submitting jobs")]
    ImageNotFound { image: String },

    #[error("worker exited with status {code}")]
    WorkerNonZeroExit { code: i64 },

    #[error("artifact '{path}' missing from worker filesystem")]
    ArtifactMissing { path: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("worker did not finish within {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("job cancelled before the worker finished")]
    Cancelled,

    #[error("job task aborted: {0}")]
    Internal(String),
}

impl JobError {
    /// Short stable label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::ImageNotFound { .. } => "image_not_found",
            JobError::WorkerNonZeroExit { .. } => "worker_non_zero_exit",
            JobError::ArtifactMissing { .. } => "artifact_missing",
            JobError::Transport(_) => "transport_error",
            JobError::Timeout { .. } => "timeout",
            JobError::Cancelled => "cancelled",
            JobError::Internal(_) => "internal",
        }
    }
}

/// Primary outcome of one job
pub type JobOutcome = std::result::Result<Artifact, JobError>;

/// Removal failure, reported beside (never instead of) the primary outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to remove environment {environment}: {detail}")]
pub struct CleanupFailure {
    pub environment: String,
    pub detail: String,
}

/// Everything the orchestrator knows about a finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    pub cleanup_failure: Option<CleanupFailure>,
    pub final_state: JobState,
    pub duration_ms: i64,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
