// Render Service - one job, end to end
//
// validate -> admit -> launch -> wait -> retrieve -> (always) remove

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::admission::AdmissionControl;
use crate::application::artifact::ArtifactRetriever;
use crate::application::cancel::{cancel_channel, CancelToken};
use crate::application::cleanup::CleanupGuard;
use crate::application::constants::{DEFAULT_ARTIFACT_PATH, DEFAULT_JOB_TIMEOUT};
use crate::application::lifecycle::{LifecycleManager, RuntimeHealth};
use crate::application::validator::validate;
use crate::domain::{
    Artifact, CleanupFailure, Job, JobError, JobOutcome, JobReport, JobRequest, RawJobRequest,
};
use crate::error::{AppError, Result};
use crate::port::{EnvironmentHandle, IdProvider, TimeProvider};

/// Per-job execution settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Absolute path of the artifact inside the worker filesystem
    pub artifact_path: String,
    /// Deadline for the worker to exit (None = wait forever)
    pub job_timeout: Option<Duration>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }
}

/// Health snapshot for the liveness endpoint
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub runtime: RuntimeHealth,
    pub available_slots: usize,
    pub max_slots: usize,
}

/// What the spawned wait/retrieve task hands back
struct WorkerRun {
    exit_code: Option<i64>,
    outcome: JobOutcome,
}

pub struct RenderService {
    runner: Arc<JobRunner>,
    admission: Arc<AdmissionControl>,
}

/// Everything one job needs, shared with the task that runs it
struct JobRunner {
    lifecycle: Arc<LifecycleManager>,
    retriever: Arc<ArtifactRetriever>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: RenderConfig,
    cancel: CancelToken,
}

impl RenderService {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        admission: Arc<AdmissionControl>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: RenderConfig,
        cancel: CancelToken,
    ) -> Self {
        let retriever = Arc::new(ArtifactRetriever::new(lifecycle.runtime()));
        Self {
            runner: Arc::new(JobRunner {
                lifecycle,
                retriever,
                id_provider,
                time_provider,
                config,
                cancel,
            }),
            admission,
        }
    }

    /// Validate, admit and run one job.
    ///
    /// # Errors
    /// - AppError::Validation before anything is allocated
    /// - AppError::Throttled if no worker slot frees up in time
    /// - AppError::Internal if the job task itself died
    ///
    /// Job failures are not errors here: they are the report's `outcome`.
    pub async fn render(&self, raw: RawJobRequest) -> Result<JobReport> {
        let request = validate(raw)?;
        self.execute(request).await
    }

    /// Admit and run an already validated request.
    ///
    /// The job runs on its own task and keeps its slot until its environment
    /// is removed. Dropping the returned future only cuts the wait short.
    pub async fn execute(&self, request: JobRequest) -> Result<JobReport> {
        let permit = self.admission.acquire().await?;

        let (abandon, abandoned) = cancel_channel();
        let _abandon_on_drop = abandon.drop_guard();

        let runner = Arc::clone(&self.runner);
        let job = tokio::spawn(async move {
            let report = runner.run(request, abandoned).await;
            drop(permit);
            report
        });

        job.await.map_err(|e| {
            error!(error = %e, "Job task failed");
            AppError::Internal(format!("job task failed: {}", e))
        })
    }

    pub async fn health(&self) -> ServiceHealth {
        ServiceHealth {
            runtime: self.runner.lifecycle.probe().await,
            available_slots: self.admission.available(),
            max_slots: self.admission.max_slots(),
        }
    }
}

impl JobRunner {
    async fn run(&self, request: JobRequest, abandoned: CancelToken) -> JobReport {
        let mut job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
        );
        info!(
            job_id = %job.id,
            target_len = request.target().len(),
            box_size = request.options().box_size,
            error_correction = %request.options().error_correction,
            "Job created"
        );

        if abandoned.is_cancelled() {
            return self.finish(job, Err(JobError::Cancelled), None);
        }

        let handle = match self.lifecycle.launch(&job.id, &request).await {
            Ok(handle) => handle,
            Err(e) => return self.finish(job, Err(e), None),
        };
        let launched = job.launched(handle.id(), self.time_provider.now_millis());
        record(&job.id, launched);

        let guard = CleanupGuard::new(self.lifecycle.runtime(), handle.clone(), job.id.clone());

        // Wait and retrieval run in their own task so a panic there is
        // contained in the JoinError and cleanup below still happens.
        let task = tokio::spawn(run_worker(
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.retriever),
            handle,
            self.config.job_timeout,
            self.cancel.clone(),
            abandoned,
            self.config.artifact_path.clone(),
        ));

        let run = match task.await {
            Ok(run) => run,
            Err(join_err) => {
                let detail = if join_err.is_panic() {
                    "worker task panicked".to_string()
                } else {
                    format!("worker task cancelled: {}", join_err)
                };
                error!(job_id = %job.id, error = %detail, "Job task aborted");
                WorkerRun {
                    exit_code: None,
                    outcome: Err(JobError::Internal(detail)),
                }
            }
        };

        if let Some(code) = run.exit_code {
            let waited = job.waited(code);
            record(&job.id, waited);
        }
        if run.outcome.is_ok() {
            let extracted = job.artifact_extracted();
            record(&job.id, extracted);
        }

        let cleanup = guard.release().await.err();
        self.finish(job, run.outcome, cleanup)
    }

    fn finish(
        &self,
        mut job: Job,
        outcome: JobOutcome,
        cleanup_failure: Option<CleanupFailure>,
    ) -> JobReport {
        let cleaned = job.clean(self.time_provider.now_millis());
        record(&job.id, cleaned);
        let duration_ms = job.duration_ms().unwrap_or_default();

        match &outcome {
            Ok(artifact) => info!(
                job_id = %job.id,
                duration_ms,
                size_bytes = artifact.len(),
                "Job succeeded"
            ),
            Err(e) => warn!(
                job_id = %job.id,
                duration_ms,
                kind = e.kind(),
                error = %e,
                "Job failed"
            ),
        }
        if let Some(failure) = &cleanup_failure {
            warn!(job_id = %job.id, error = %failure, "Cleanup failure recorded");
        }

        JobReport {
            job_id: job.id,
            outcome,
            cleanup_failure,
            final_state: job.state,
            duration_ms,
        }
    }
}

async fn run_worker(
    lifecycle: Arc<LifecycleManager>,
    retriever: Arc<ArtifactRetriever>,
    handle: EnvironmentHandle,
    deadline: Option<Duration>,
    cancel: CancelToken,
    mut abandoned: CancelToken,
    artifact_path: String,
) -> WorkerRun {
    let waited = tokio::select! {
        res = lifecycle.wait(&handle, deadline, cancel) => res,
        _ = abandoned.cancelled() => {
            warn!(container_id = %handle, "Caller went away, abandoning wait");
            Err(JobError::Cancelled)
        }
    };

    let code = match waited {
        Ok(code) => code,
        Err(e) => {
            return WorkerRun {
                exit_code: None,
                outcome: Err(e),
            }
        }
    };

    if code != 0 {
        return WorkerRun {
            exit_code: Some(code),
            outcome: Err(JobError::WorkerNonZeroExit { code }),
        };
    }

    let outcome = retriever
        .retrieve(&handle, &artifact_path)
        .await
        .map(Artifact::png);

    if let Ok(artifact) = &outcome {
        if !artifact.is_png() {
            warn!(container_id = %handle, "Artifact does not start with the PNG signature");
        }
    }

    WorkerRun {
        exit_code: Some(code),
        outcome,
    }
}

/// State transitions only fail on a sequencing bug; log rather than abort the job
fn record(job_id: &str, transition: crate::domain::error::Result<()>) {
    if let Err(e) = transition {
        error!(job_id = %job_id, error = %e, "Job state machine violated");
    }
}
