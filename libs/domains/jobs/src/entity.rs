//! Sea-ORM entities for the `job_status` and `result_cache` tables.

pub mod job_status {
    use sea_orm::entity::prelude::*;

    /// One row per (subject, job_kind); the composite primary key is the uniqueness constraint
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "job_status")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub subject: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub job_kind: String,
        pub id: Uuid,
        pub state: String,
        #[sea_orm(column_type = "JsonBinary")]
        pub details: Json,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod result_cache {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "result_cache")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub subject: String,
        #[sea_orm(column_type = "JsonBinary")]
        pub payload: Json,
        pub saved_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

use sea_orm::ActiveValue::Set;
use std::str::FromStr;

use crate::error::{JobError, JobResult};
use crate::models::{CacheSnapshot, JobKind, JobState, JobStatus};

impl TryFrom<job_status::Model> for JobStatus {
    type Error = JobError;

    fn try_from(model: job_status::Model) -> JobResult<Self> {
        let kind = JobKind::from_str(&model.job_kind)
            .map_err(|e| JobError::Store(format!("unknown job kind '{}': {}", model.job_kind, e)))?;
        let state = JobState::from_str(&model.state)
            .map_err(|e| JobError::Store(format!("unknown job state '{}': {}", model.state, e)))?;

        Ok(Self {
            id: model.id,
            subject: model.subject,
            kind,
            state,
            details: serde_json::from_value(model.details)?,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

impl TryFrom<&JobStatus> for job_status::ActiveModel {
    type Error = JobError;

    fn try_from(status: &JobStatus) -> JobResult<Self> {
        Ok(job_status::ActiveModel {
            subject: Set(status.subject.clone()),
            job_kind: Set(status.kind.to_string()),
            id: Set(status.id),
            state: Set(status.state.to_string()),
            details: Set(serde_json::to_value(&status.details)?),
            created_at: Set(status.created_at.into()),
            updated_at: Set(status.updated_at.into()),
        })
    }
}

impl From<result_cache::Model> for CacheSnapshot {
    fn from(model: result_cache::Model) -> Self {
        Self {
            subject: model.subject,
            payload: model.payload,
            saved_at: model.saved_at.into(),
        }
    }
}

impl From<CacheSnapshot> for result_cache::ActiveModel {
    fn from(snapshot: CacheSnapshot) -> Self {
        result_cache::ActiveModel {
            subject: Set(snapshot.subject),
            payload: Set(snapshot.payload),
            saved_at: Set(snapshot.saved_at.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobDetails;
    use chrono::Utc;

    #[test]
    fn test_status_model_conversion() {
        let status = JobStatus::pending("acme", JobDetails::empty(JobKind::Deploy), Utc::now());
        let active = job_status::ActiveModel::try_from(&status).unwrap();

        let model = job_status::Model {
            subject: active.subject.unwrap(),
            job_kind: active.job_kind.unwrap(),
            id: active.id.unwrap(),
            state: active.state.unwrap(),
            details: active.details.unwrap(),
            created_at: active.created_at.unwrap(),
            updated_at: active.updated_at.unwrap(),
        };
        assert_eq!(model.job_kind, "deploy");
        assert_eq!(model.state, "pending");

        let back = JobStatus::try_from(model).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_unknown_state_is_a_store_error() {
        let status = JobStatus::pending("acme", JobDetails::empty(JobKind::Refresh), Utc::now());
        let model = job_status::Model {
            subject: status.subject.clone(),
            job_kind: "refresh".into(),
            id: status.id,
            state: "running".into(),
            details: serde_json::to_value(&status.details).unwrap(),
            created_at: status.created_at.into(),
            updated_at: status.updated_at.into(),
        };

        assert!(matches!(JobStatus::try_from(model), Err(JobError::Store(_))));
    }
}
