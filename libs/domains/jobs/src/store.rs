use chrono::{DateTime, TimeDelta, Utc};
use observability::JobMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::clock::Clock;
use crate::error::{JobError, JobResult};
use crate::models::{JobDetails, JobKind, JobState, JobStatus};
use crate::repository::JobStatusRepository;

/// Lifecycle rules for job status rows: pending → done | failed.
///
/// One row per (subject, kind). Terminal rows are never mutated again, only
/// deleted or replaced by `create`.
#[derive(Clone)]
pub struct JobStatusStore {
    repository: Arc<dyn JobStatusRepository>,
    clock: Arc<dyn Clock>,
}

impl JobStatusStore {
    pub fn new(repository: Arc<dyn JobStatusRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn get(&self, subject: &str, kind: JobKind) -> JobResult<Option<JobStatus>> {
        self.repository.find(subject, kind).await
    }

    /// Replace any row for the key with a new pending one
    #[instrument(skip(self, details), fields(subject = %subject, kind = %kind))]
    pub async fn create(
        &self,
        subject: &str,
        kind: JobKind,
        details: JobDetails,
    ) -> JobResult<JobStatus> {
        if details.kind() != kind {
            return Err(JobError::DetailsMismatch {
                kind,
                details: details.kind(),
            });
        }

        if self.repository.delete(subject, kind).await? {
            tracing::debug!("Replaced previous job status");
        }

        let status = self
            .repository
            .insert(JobStatus::pending(subject, details, self.clock.now()))
            .await?;

        tracing::info!(job_id = %status.id, "Created pending job");
        Ok(status)
    }

    /// Overwrite the progress payload of a pending row
    pub async fn update_details(
        &self,
        row: &JobStatus,
        details: JobDetails,
    ) -> JobResult<JobStatus> {
        self.write(row, JobState::Pending, details).await
    }

    /// Move a pending row to done or failed, keeping its details
    pub async fn update_state(&self, row: &JobStatus, state: JobState) -> JobResult<JobStatus> {
        self.finish(row, state, row.details.clone()).await
    }

    /// Move a pending row to done or failed with final details in one write
    #[instrument(skip(self, row, details), fields(subject = %row.subject, kind = %row.kind, state = %state))]
    pub async fn finish(
        &self,
        row: &JobStatus,
        state: JobState,
        details: JobDetails,
    ) -> JobResult<JobStatus> {
        if !state.is_terminal() {
            return Err(JobError::InvalidTransition {
                from: row.state,
                to: state,
            });
        }

        let status = self.write(row, state, details).await?;
        tracing::info!(job_id = %status.id, "Job reached terminal state");
        Ok(status)
    }

    /// Lazily fail a pending row older than `timeout`.
    ///
    /// Terminal rows are returned unchanged.
    pub async fn check_expired(&self, row: JobStatus, timeout: Duration) -> JobResult<JobStatus> {
        if !row.is_pending() {
            return Ok(row);
        }

        let age = self.clock.now() - row.created_at;
        let limit = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        if age <= limit {
            return Ok(row);
        }

        let mut details = row.details.clone();
        details.record_error(format!(
            "Job expired: still pending after {}s (timeout {}s)",
            age.num_seconds(),
            timeout.as_secs()
        ));

        let written = self.write(&row, JobState::Failed, details).await;
        match written {
            Ok(expired) => {
                JobMetrics::record_expired(&row.kind.to_string());
                tracing::warn!(
                    subject = %row.subject,
                    kind = %row.kind,
                    job_id = %row.id,
                    age_secs = age.num_seconds(),
                    "Marked expired job as failed"
                );
                Ok(expired)
            }
            // Someone else finished or replaced the row first; report what is stored now
            Err(JobError::Superseded { .. }) | Err(JobError::InvalidTransition { .. }) => Ok(self
                .repository
                .find(&row.subject, row.kind)
                .await?
                .unwrap_or(row)),
            Err(e) => Err(e),
        }
    }

    /// Read a row and apply lazy expiry
    pub async fn get_checked(
        &self,
        subject: &str,
        kind: JobKind,
        timeout: Duration,
    ) -> JobResult<Option<JobStatus>> {
        match self.repository.find(subject, kind).await? {
            Some(row) => Ok(Some(self.check_expired(row, timeout).await?)),
            None => Ok(None),
        }
    }

    /// Whether `row` is still the stored row for its key
    pub async fn is_current(&self, row: &JobStatus) -> JobResult<bool> {
        Ok(self
            .repository
            .find(&row.subject, row.kind)
            .await?
            .is_some_and(|stored| stored.id == row.id))
    }

    #[instrument(skip(self), fields(subject = %subject, kind = %kind))]
    pub async fn delete(&self, subject: &str, kind: JobKind) -> JobResult<bool> {
        self.repository.delete(subject, kind).await
    }

    async fn write(
        &self,
        row: &JobStatus,
        state: JobState,
        details: JobDetails,
    ) -> JobResult<JobStatus> {
        if !row.is_pending() {
            return Err(JobError::InvalidTransition {
                from: row.state,
                to: state,
            });
        }
        if details.kind() != row.kind {
            return Err(JobError::DetailsMismatch {
                kind: row.kind,
                details: details.kind(),
            });
        }

        let updated = JobStatus {
            state,
            details,
            updated_at: self.clock.now(),
            ..row.clone()
        };

        if self.repository.update(&updated).await? {
            return Ok(updated);
        }

        // Same row instance but already terminal, or replaced by a newer job
        match self.repository.find(&row.subject, row.kind).await? {
            Some(stored) if stored.id == row.id => Err(JobError::InvalidTransition {
                from: stored.state,
                to: state,
            }),
            _ => Err(JobError::Superseded {
                subject: row.subject.clone(),
                kind: row.kind,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, MockClock};
    use crate::models::RefreshProgress;
    use crate::repository::{InMemoryJobStatusRepository, MockJobStatusRepository};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    fn store() -> (JobStatusStore, Arc<ManualClock>, InMemoryJobStatusRepository) {
        let clock = Arc::new(ManualClock::new(t0()));
        let repo = InMemoryJobStatusRepository::new();
        (
            JobStatusStore::new(Arc::new(repo.clone()), clock.clone()),
            clock,
            repo,
        )
    }

    fn refresh() -> JobDetails {
        JobDetails::Refresh(RefreshProgress::new(1))
    }

    #[tokio::test]
    async fn test_create_replaces_existing_row() {
        let (store, clock, repo) = store();
        let first = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();
        store.update_state(&first, JobState::Done).await.unwrap();

        clock.advance(TimeDelta::seconds(5));
        let second = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();

        assert_eq!(repo.len().await, 1);
        let stored = store.get("acme", JobKind::Refresh).await.unwrap().unwrap();
        assert_eq!(stored.id, second.id);
        assert_eq!(stored.state, JobState::Pending);
        assert_eq!(stored.created_at, t0() + TimeDelta::seconds(5));
    }

    #[tokio::test]
    async fn test_create_rejects_mismatched_details() {
        let (store, _, _) = store();
        let result = store
            .create("acme", JobKind::Deploy, JobDetails::empty(JobKind::Refresh))
            .await;

        assert!(matches!(result, Err(JobError::DetailsMismatch { .. })));
    }

    #[tokio::test]
    async fn test_update_details_only_while_pending() {
        let (store, _, _) = store();
        let row = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();

        let mut progress = RefreshProgress::new(1);
        progress.regions_done.push("eu-central-1".into());
        let row = store
            .update_details(&row, JobDetails::Refresh(progress))
            .await
            .unwrap();

        let done = store.update_state(&row, JobState::Done).await.unwrap();
        let result = store.update_details(&done, refresh()).await;
        assert!(matches!(
            result,
            Err(JobError::InvalidTransition {
                from: JobState::Done,
                to: JobState::Pending
            })
        ));

        // A stale in-memory copy cannot resurrect a terminal row
        let result = store.update_details(&row, refresh()).await;
        assert!(matches!(result, Err(JobError::InvalidTransition { .. })));
        let stored = store.get("acme", JobKind::Refresh).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Done);
    }

    #[tokio::test]
    async fn test_update_state_requires_terminal_target() {
        let (store, _, _) = store();
        let row = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();

        let result = store.update_state(&row, JobState::Pending).await;
        assert!(matches!(result, Err(JobError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_update_on_replaced_row_is_superseded() {
        let (store, _, _) = store();
        let old = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();
        store.create("acme", JobKind::Refresh, refresh()).await.unwrap();

        let result = store.update_state(&old, JobState::Done).await;
        assert!(matches!(result, Err(JobError::Superseded { .. })));
        assert!(!store.is_current(&old).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_expired_boundary() {
        let (store, clock, _) = store();
        let timeout = Duration::from_secs(600);
        let row = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();

        clock.advance(TimeDelta::seconds(600));
        let checked = store.check_expired(row, timeout).await.unwrap();
        assert_eq!(checked.state, JobState::Pending);

        clock.advance(TimeDelta::milliseconds(1));
        let checked = store.check_expired(checked, timeout).await.unwrap();
        assert_eq!(checked.state, JobState::Failed);
        assert!(checked.details.error().unwrap().contains("expired"));
    }

    #[tokio::test]
    async fn test_check_expired_ignores_terminal_rows() {
        let (store, clock, _) = store();
        let row = store.create("acme", JobKind::Refresh, refresh()).await.unwrap();
        let done = store.update_state(&row, JobState::Done).await.unwrap();

        clock.advance(TimeDelta::hours(2));
        let checked = store
            .check_expired(done.clone(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(checked, done);
    }

    #[tokio::test]
    async fn test_get_checked_applies_expiry() {
        let (store, clock, _) = store();
        store.create("acme", JobKind::Refresh, refresh()).await.unwrap();

        clock.advance(TimeDelta::seconds(700));
        let status = store
            .get_checked("acme", JobKind::Refresh, Duration::from_secs(600))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, JobState::Failed);

        assert!(
            store
                .get_checked("other", JobKind::Refresh, Duration::from_secs(600))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut repo = MockJobStatusRepository::new();
        repo.expect_delete()
            .returning(|_, _| Err(JobError::Store("connection reset".into())));
        let mut clock = MockClock::new();
        clock.expect_now().return_const(t0());

        let store = JobStatusStore::new(Arc::new(repo), Arc::new(clock));
        let result = store.create("acme", JobKind::Refresh, refresh()).await;

        assert!(matches!(result, Err(JobError::Store(_))));
    }
}
