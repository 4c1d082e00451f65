use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::{
    entity::{job_status, result_cache},
    error::{JobError, JobResult},
    models::{CacheSnapshot, JobKind, JobState, JobStatus},
    repository::{JobStatusRepository, ResultCacheRepository},
};

pub struct PgJobStatusRepository {
    db: DatabaseConnection,
}

impl PgJobStatusRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobStatusRepository for PgJobStatusRepository {
    async fn find(&self, subject: &str, kind: JobKind) -> JobResult<Option<JobStatus>> {
        let model = job_status::Entity::find_by_id((subject.to_string(), kind.to_string()))
            .one(&self.db)
            .await?;

        model.map(JobStatus::try_from).transpose()
    }

    async fn insert(&self, status: JobStatus) -> JobResult<JobStatus> {
        let active_model = job_status::ActiveModel::try_from(&status)?;

        job_status::Entity::insert(active_model)
            .exec(&self.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => JobError::Conflict {
                    subject: status.subject.clone(),
                    kind: status.kind,
                },
                _ => JobError::from(e),
            })?;

        tracing::debug!(subject = %status.subject, kind = %status.kind, job_id = %status.id, "Inserted job status");
        Ok(status)
    }

    async fn update(&self, status: &JobStatus) -> JobResult<bool> {
        let active_model = job_status::ActiveModel::try_from(status)?;

        let result = job_status::Entity::update_many()
            .set(active_model)
            .filter(job_status::Column::Subject.eq(status.subject.as_str()))
            .filter(job_status::Column::JobKind.eq(status.kind.to_string()))
            .filter(job_status::Column::Id.eq(status.id))
            .filter(job_status::Column::State.eq(JobState::Pending.to_string()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn delete(&self, subject: &str, kind: JobKind) -> JobResult<bool> {
        let result = job_status::Entity::delete_many()
            .filter(job_status::Column::Subject.eq(subject))
            .filter(job_status::Column::JobKind.eq(kind.to_string()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

pub struct PgResultCacheRepository {
    db: DatabaseConnection,
}

impl PgResultCacheRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultCacheRepository for PgResultCacheRepository {
    async fn get(&self, subject: &str) -> JobResult<Option<CacheSnapshot>> {
        let model = result_cache::Entity::find_by_id(subject.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(Into::into))
    }

    async fn upsert(&self, snapshot: CacheSnapshot) -> JobResult<()> {
        let subject = snapshot.subject.clone();
        let active_model: result_cache::ActiveModel = snapshot.into();

        result_cache::Entity::insert(active_model)
            .on_conflict(
                OnConflict::column(result_cache::Column::Subject)
                    .update_columns([result_cache::Column::Payload, result_cache::Column::SavedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        tracing::debug!(subject = %subject, "Saved result cache");
        Ok(())
    }

    async fn delete(&self, subject: &str) -> JobResult<bool> {
        let result = result_cache::Entity::delete_by_id(subject.to_string())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
