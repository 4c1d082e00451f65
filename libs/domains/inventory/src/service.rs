use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain_jobs::{
    BillingProgress, Clock, DeployChecklist, JobDetails, JobHandle, JobKind, JobOutcome,
    JobRunner, JobStatus, RefreshProgress, Submission,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::billing::BillingCalculator;
use crate::cloud_api::{CloudApiFactory, Credentials};
use crate::collectors::CollectContext;
use crate::deploy::{ApiProvisioner, DeployPipeline, DeployRequest, PollPolicy};
use crate::error::{InventoryError, InventoryResult};
use crate::files::FileStorage;
use crate::models::Scope;
use crate::orchestrator::{CollectionObserver, CollectionOrchestrator, CollectionReport};

/// How long a pending job of each kind may run before it is considered stuck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    pub refresh: Duration,
    pub billing: Duration,
    pub deploy: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(600),
            billing: Duration::from_secs(600),
            deploy: Duration::from_secs(1800),
        }
    }
}

impl JobTimeouts {
    pub fn for_kind(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Refresh => self.refresh,
            JobKind::Billing => self.billing,
            JobKind::Deploy => self.deploy,
        }
    }
}

/// What a caller sees when asking for the last inventory
#[derive(Debug, Clone, PartialEq)]
pub enum CachedView {
    Ready {
        report: CollectionReport,
        saved_at: DateTime<Utc>,
    },
    NoData,
}

/// Caller-facing API over inventory refresh, billing and deploy jobs
pub struct InventoryService {
    runner: JobRunner,
    orchestrator: Arc<CollectionOrchestrator>,
    factory: Arc<dyn CloudApiFactory>,
    billing: Arc<BillingCalculator>,
    timeouts: JobTimeouts,
    deploy_poll_interval: Duration,
}

impl InventoryService {
    pub fn new(
        runner: JobRunner,
        orchestrator: CollectionOrchestrator,
        factory: Arc<dyn CloudApiFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runner,
            orchestrator: Arc::new(orchestrator),
            factory,
            billing: Arc::new(BillingCalculator::new(clock)),
            timeouts: JobTimeouts::default(),
            deploy_poll_interval: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, timeouts: JobTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// How often a deploy checks whether the new instance is ready
    pub fn with_deploy_poll_interval(mut self, interval: Duration) -> Self {
        self.deploy_poll_interval = interval;
        self
    }

    pub fn timeouts(&self) -> &JobTimeouts {
        &self.timeouts
    }

    /// Status of the subject's job of `kind`; a stuck pending job is failed on read
    #[instrument(skip(self))]
    pub async fn get_status(
        &self,
        subject: &str,
        kind: JobKind,
    ) -> InventoryResult<Option<JobStatus>> {
        let status = self
            .runner
            .store()
            .get_checked(subject, kind, self.timeouts.for_kind(kind))
            .await?;
        Ok(status)
    }

    /// Last completed inventory of the subject
    #[instrument(skip(self))]
    pub async fn get_cached_result(&self, subject: &str) -> InventoryResult<CachedView> {
        let Some(snapshot) = self.runner.cache().get(subject).await? else {
            return Ok(CachedView::NoData);
        };

        let report: CollectionReport = serde_json::from_value(snapshot.payload)?;
        Ok(CachedView::Ready {
            report,
            saved_at: snapshot.saved_at,
        })
    }

    /// Verify the credentials, then start a collection pass unless one is running
    #[instrument(skip(self, credentials))]
    pub async fn trigger_refresh(
        &self,
        subject: &str,
        credentials: &Credentials,
    ) -> InventoryResult<Submission> {
        let ctx = self.connect(credentials).await?;
        let orchestrator = self.orchestrator.clone();
        let initial = JobDetails::Refresh(RefreshProgress::new(orchestrator.regions().len()));

        let submission = self
            .runner
            .run_async(
                subject,
                initial,
                self.timeouts.refresh,
                move |handle| async move {
                    let reporter = RefreshReporter { handle };
                    let report = orchestrator.collect_with(&ctx, &reporter).await;

                    let mut progress = match reporter.handle.details().await {
                        JobDetails::Refresh(progress) => progress,
                        _ => RefreshProgress::new(orchestrator.regions().len()),
                    };
                    progress.failed_slices = report.failed_slices();

                    let payload = serde_json::to_value(&report)?;
                    Ok::<_, InventoryError>(JobOutcome::Snapshot {
                        payload,
                        details: JobDetails::Refresh(progress),
                    })
                },
            )
            .await?;

        log_submission(&submission);
        Ok(submission)
    }

    /// Verify the credentials, then rebuild the billing summary.
    ///
    /// The previous summary stays visible in the job details while the new
    /// one is computed.
    #[instrument(skip(self, credentials))]
    pub async fn trigger_billing(
        &self,
        subject: &str,
        credentials: &Credentials,
    ) -> InventoryResult<Submission> {
        let ctx = self.connect(credentials).await?;

        let previous = match self.runner.store().get(subject, JobKind::Billing).await? {
            Some(JobStatus {
                details: JobDetails::Billing(progress),
                ..
            }) => progress.summary,
            _ => None,
        };
        let initial = JobDetails::Billing(BillingProgress {
            summary: previous,
            error: None,
        });

        let billing = self.billing.clone();
        let regions = self.orchestrator.regions().to_vec();
        let submission = self
            .runner
            .run_async(
                subject,
                initial,
                self.timeouts.billing,
                move |_handle| async move {
                    let summary = billing.build(&ctx, &regions).await?;
                    Ok::<_, InventoryError>(JobOutcome::Details(JobDetails::Billing(
                        BillingProgress {
                            summary: Some(summary),
                            error: None,
                        },
                    )))
                },
            )
            .await?;

        log_submission(&submission);
        Ok(submission)
    }

    /// Verify the credentials, then provision a new instance and wait until it serves
    #[instrument(skip(self, credentials, request), fields(region = %request.region, resource = %request.resource_name))]
    pub async fn trigger_deploy(
        &self,
        subject: &str,
        credentials: &Credentials,
        request: DeployRequest,
    ) -> InventoryResult<Submission> {
        let ctx = self.connect(credentials).await?;

        let pipeline = DeployPipeline::new(
            ctx.api.clone(),
            Arc::new(ApiProvisioner::new(ctx.api.clone())),
            PollPolicy::covering(self.timeouts.deploy, self.deploy_poll_interval),
        );
        let submission = self
            .runner
            .run_async(
                subject,
                JobDetails::Deploy(DeployChecklist::default()),
                self.timeouts.deploy,
                move |handle| async move {
                    let checklist = pipeline.run(&request, &handle).await?;
                    Ok::<_, InventoryError>(JobOutcome::Details(JobDetails::Deploy(checklist)))
                },
            )
            .await?;

        log_submission(&submission);
        Ok(submission)
    }

    /// Browse the account's object storage once the credentials check out
    #[instrument(skip(self, credentials))]
    pub async fn file_storage(&self, credentials: &Credentials) -> InventoryResult<FileStorage> {
        let ctx = self.connect(credentials).await?;
        Ok(FileStorage::new(ctx.api))
    }

    /// Drop the status row once the caller has seen the outcome
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, subject: &str, kind: JobKind) -> InventoryResult<bool> {
        Ok(self.runner.store().delete(subject, kind).await?)
    }

    async fn connect(&self, credentials: &Credentials) -> InventoryResult<CollectContext> {
        let api = self.factory.connect(credentials).map_err(|e| {
            if e.is_auth_failure() {
                InventoryError::Credentials(e.to_string())
            } else {
                InventoryError::Api(e)
            }
        })?;
        self.orchestrator.prepare(api).await
    }
}

fn log_submission(submission: &Submission) {
    let status = submission.status();
    match submission {
        Submission::Started { .. } => {
            tracing::info!(job_id = %status.id, kind = %status.kind, "Job submitted")
        }
        Submission::AlreadyRunning(_) => {
            tracing::info!(job_id = %status.id, kind = %status.kind, "Job already in flight")
        }
    }
}

/// Mirrors scope completion into the refresh job's progress
struct RefreshReporter {
    handle: JobHandle,
}

#[async_trait]
impl CollectionObserver for RefreshReporter {
    async fn scope_finished(&self, scope: &Scope, failed_services: Vec<String>) {
        let result = self
            .handle
            .modify(|details| {
                if let JobDetails::Refresh(progress) = details {
                    match scope {
                        Scope::Regional(region) => progress.regions_done.push(region.clone()),
                        Scope::Global => progress.global_done = true,
                    }
                    progress.failed_slices.extend(
                        failed_services
                            .iter()
                            .map(|service| format!("{scope}/{service}")),
                    );
                }
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(scope = %scope, error = %e, "Failed to report refresh progress");
        }
    }
}
