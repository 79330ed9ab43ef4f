// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod outcome;
pub mod request;

// Re-exports
pub use error::{DomainError, ValidationError};
pub use job::{Job, JobId, JobState};
pub use outcome::{Artifact, CleanupFailure, JobError, JobOutcome, JobReport, PNG_MAGIC};
pub use request::{env_keys, ErrorCorrection, JobRequest, RawJobRequest, RenderOptions};
