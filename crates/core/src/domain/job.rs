// Job Domain Model
//
// Created -> Launched -> Waited(exit) -> [ArtifactExtracted] -> Cleaned
// Any non-terminal state may jump straight to Cleaned on failure.

use serde::Serialize;

use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4)
pub type JobId = String;

/// Job State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Launched,
    Waited { exit_code: i64 },
    ArtifactExtracted,
    Cleaned,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cleaned)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "CREATED"),
            JobState::Launched => write!(f, "LAUNCHED"),
            JobState::Waited { exit_code } => write!(f, "WAITED({})", exit_code),
            JobState::ArtifactExtracted => write!(f, "ARTIFACT_EXTRACTED"),
            JobState::Cleaned => write!(f, "CLEANED"),
        }
    }
}

/// One request-to-artifact transaction, held in memory for its duration only
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    /// Container id once launched
    pub environment: Option<String>,
}

impl Job {
    /// Create a new Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            state: JobState::Created,
            created_at,
            started_at: None,
            finished_at: None,
            environment: None,
        }
    }

    fn invalid(&self, to: &str) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    /// Created -> Launched
    pub fn launched(&mut self, environment: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.state != JobState::Created {
            return Err(self.invalid("LAUNCHED"));
        }
        self.state = JobState::Launched;
        self.environment = Some(environment.into());
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Launched -> Waited
    pub fn waited(&mut self, exit_code: i64) -> Result<()> {
        if self.state != JobState::Launched {
            return Err(self.invalid("WAITED"));
        }
        self.state = JobState::Waited { exit_code };
        Ok(())
    }

    /// Waited(0) -> ArtifactExtracted
    pub fn artifact_extracted(&mut self) -> Result<()> {
        if self.state != (JobState::Waited { exit_code: 0 }) {
            return Err(self.invalid("ARTIFACT_EXTRACTED"));
        }
        self.state = JobState::ArtifactExtracted;
        Ok(())
    }

    /// Any non-terminal state -> Cleaned. Reached exactly once.
    pub fn clean(&mut self, now_millis: i64) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid("CLEANED"));
        }
        self.state = JobState::Cleaned;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Wall time from creation to cleanup, if finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at.map(|end| end - self.created_at)
    }
}
