//! Detached execution of background jobs.
//!
//! `run_async` returns once the pending row is durably written. The job then
//! runs in its own tokio task and the runner performs exactly one terminal
//! write for it, whatever the job does.

use observability::JobMetrics;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::cache::ResultCache;
use crate::error::{JobError, JobResult};
use crate::models::{JobDetails, JobState, JobStatus};
use crate::store::JobStatusStore;

/// What a finished job hands back to the runner
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Save `payload` as the subject's cached result, then finish with `details`
    Snapshot {
        payload: serde_json::Value,
        details: JobDetails,
    },
    /// Finish with `details`; the cache is left untouched
    Details(JobDetails),
}

impl JobOutcome {
    fn into_parts(self) -> (Option<serde_json::Value>, JobDetails) {
        match self {
            JobOutcome::Snapshot { payload, details } => (Some(payload), details),
            JobOutcome::Details(details) => (None, details),
        }
    }
}

/// Result of a submission
#[derive(Debug)]
pub enum Submission {
    /// A new pending row was written and the job spawned
    Started {
        status: JobStatus,
        task: JoinHandle<JobStatus>,
    },
    /// A job for the key is still pending; nothing was started
    AlreadyRunning(JobStatus),
}

impl Submission {
    pub fn status(&self) -> &JobStatus {
        match self {
            Submission::Started { status, .. } => status,
            Submission::AlreadyRunning(status) => status,
        }
    }

    pub fn into_status(self) -> JobStatus {
        match self {
            Submission::Started { status, .. } => status,
            Submission::AlreadyRunning(status) => status,
        }
    }
}

/// Progress reporting handle given to a running job
#[derive(Clone)]
pub struct JobHandle {
    store: JobStatusStore,
    current: Arc<Mutex<JobStatus>>,
}

impl JobHandle {
    fn new(store: JobStatusStore, status: JobStatus) -> Self {
        Self {
            store,
            current: Arc::new(Mutex::new(status)),
        }
    }

    /// Latest row as written by this job
    pub async fn current(&self) -> JobStatus {
        self.current.lock().await.clone()
    }

    pub async fn details(&self) -> JobDetails {
        self.current.lock().await.details.clone()
    }

    /// Replace the progress payload
    pub async fn report(&self, details: JobDetails) -> JobResult<()> {
        let mut current = self.current.lock().await;
        *current = self.store.update_details(&current, details).await?;
        Ok(())
    }

    /// Edit the progress payload in place; concurrent callers are serialized
    pub async fn modify<F>(&self, edit: F) -> JobResult<()>
    where
        F: FnOnce(&mut JobDetails),
    {
        let mut current = self.current.lock().await;
        let mut details = current.details.clone();
        edit(&mut details);
        *current = self.store.update_details(&current, details).await?;
        Ok(())
    }
}

/// Submits jobs and owns their terminal status write
#[derive(Clone)]
pub struct JobRunner {
    store: JobStatusStore,
    cache: ResultCache,
}

impl JobRunner {
    pub fn new(store: JobStatusStore, cache: ResultCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &JobStatusStore {
        &self.store
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Start `job` for `subject` unless a job of the same kind is still pending.
    ///
    /// A pending row older than `timeout` is failed first and then replaced.
    pub async fn run_async<F, Fut, E>(
        &self,
        subject: &str,
        initial: JobDetails,
        timeout: Duration,
        job: F,
    ) -> JobResult<Submission>
    where
        F: FnOnce(JobHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<JobOutcome, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let kind = initial.kind();

        if let Some(existing) = self.store.get_checked(subject, kind, timeout).await? {
            if existing.is_pending() {
                tracing::info!(subject = %subject, kind = %kind, job_id = %existing.id, "Job already running");
                return Ok(Submission::AlreadyRunning(existing));
            }
        }

        let status = self.store.create(subject, kind, initial).await?;
        JobMetrics::record_started(&kind.to_string());

        let span = tracing::info_span!("job", subject = %subject, kind = %kind, job_id = %status.id);
        let handle = JobHandle::new(self.store.clone(), status.clone());
        let runner = self.clone();
        let subject = subject.to_string();

        let task = tokio::spawn(
            async move {
                let started = Instant::now();
                // Nested task so a panic inside the job still ends in a terminal write
                let result = tokio::spawn(job(handle.clone())).await;
                let last = handle.current().await;

                let finished = runner.complete(&subject, last, result).await;
                JobMetrics::record_finished(
                    &kind.to_string(),
                    &finished.state.to_string(),
                    started.elapsed().as_secs_f64(),
                );
                finished
            }
            .instrument(span),
        );

        Ok(Submission::Started { status, task })
    }

    async fn complete<E: Display>(
        &self,
        subject: &str,
        last: JobStatus,
        result: Result<Result<JobOutcome, E>, tokio::task::JoinError>,
    ) -> JobStatus {
        let (state, details) = match result {
            Ok(Ok(outcome)) => {
                let (payload, details) = outcome.into_parts();
                self.settle_success(subject, &last, payload, details).await
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Job failed");
                let mut details = last.details.clone();
                details.record_error(err.to_string());
                (JobState::Failed, details)
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "Job aborted");
                let mut details = last.details.clone();
                details.record_error(format!("Job aborted: {join_err}"));
                (JobState::Failed, details)
            }
        };

        match self.store.finish(&last, state, details).await {
            Ok(status) => status,
            Err(JobError::Superseded { .. }) => {
                tracing::info!("Job was replaced by a newer one; dropping its result");
                last
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to record terminal job state");
                last
            }
        }
    }

    async fn settle_success(
        &self,
        subject: &str,
        last: &JobStatus,
        payload: Option<serde_json::Value>,
        details: JobDetails,
    ) -> (JobState, JobDetails) {
        if details.kind() != last.kind {
            let mut fallback = last.details.clone();
            fallback.record_error(format!(
                "Job returned {} details for a {} job",
                details.kind(),
                last.kind
            ));
            return (JobState::Failed, fallback);
        }

        let Some(payload) = payload else {
            return (JobState::Done, details);
        };

        // A replaced job must not overwrite the newer job's snapshot
        match self.store.is_current(last).await {
            Ok(true) => {}
            Ok(false) => return (JobState::Done, details),
            Err(err) => {
                let mut details = details;
                details.record_error(format!("Failed to check job status: {err}"));
                return (JobState::Failed, details);
            }
        }

        match self.cache.save(subject, payload).await {
            Ok(_) => (JobState::Done, details),
            Err(err) => {
                tracing::error!(error = %err, "Failed to save result snapshot");
                let mut details = details;
                details.record_error(format!("Failed to save result: {err}"));
                (JobState::Failed, details)
            }
        }
    }
}
