use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{JobError, JobResult};
use crate::models::{CacheSnapshot, JobKind, JobStatus};

/// Key-based persistence for job status rows.
///
/// Backends must enforce uniqueness of (subject, kind).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStatusRepository: Send + Sync {
    /// Get the row for a key
    async fn find(&self, subject: &str, kind: JobKind) -> JobResult<Option<JobStatus>>;

    /// Insert a new row; fails with `Conflict` when the key is taken
    async fn insert(&self, status: JobStatus) -> JobResult<JobStatus>;

    /// Overwrite the pending row with the same key and row id.
    ///
    /// Returns false when the stored row is missing, has another id or is
    /// already terminal.
    async fn update(&self, status: &JobStatus) -> JobResult<bool>;

    /// Delete the row for a key
    async fn delete(&self, subject: &str, kind: JobKind) -> JobResult<bool>;
}

/// Key-based persistence for the one cached result per subject
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultCacheRepository: Send + Sync {
    async fn get(&self, subject: &str) -> JobResult<Option<CacheSnapshot>>;

    /// Insert or overwrite the row for `snapshot.subject`
    async fn upsert(&self, snapshot: CacheSnapshot) -> JobResult<()>;

    async fn delete(&self, subject: &str) -> JobResult<bool>;
}

/// In-memory job status rows (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStatusRepository {
    rows: Arc<RwLock<HashMap<(String, JobKind), JobStatus>>>,
}

impl InMemoryJobStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl JobStatusRepository for InMemoryJobStatusRepository {
    async fn find(&self, subject: &str, kind: JobKind) -> JobResult<Option<JobStatus>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(subject.to_string(), kind)).cloned())
    }

    async fn insert(&self, status: JobStatus) -> JobResult<JobStatus> {
        let mut rows = self.rows.write().await;
        let key = (status.subject.clone(), status.kind);

        if rows.contains_key(&key) {
            return Err(JobError::Conflict {
                subject: status.subject,
                kind: status.kind,
            });
        }

        rows.insert(key, status.clone());
        Ok(status)
    }

    async fn update(&self, status: &JobStatus) -> JobResult<bool> {
        let mut rows = self.rows.write().await;

        match rows.get_mut(&(status.subject.clone(), status.kind)) {
            Some(row) if row.id == status.id && row.is_pending() => {
                *row = status.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, subject: &str, kind: JobKind) -> JobResult<bool> {
        let mut rows = self.rows.write().await;
        Ok(rows.remove(&(subject.to_string(), kind)).is_some())
    }
}

/// In-memory result cache (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryResultCacheRepository {
    rows: Arc<RwLock<HashMap<String, CacheSnapshot>>>,
}

impl InMemoryResultCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultCacheRepository for InMemoryResultCacheRepository {
    async fn get(&self, subject: &str) -> JobResult<Option<CacheSnapshot>> {
        Ok(self.rows.read().await.get(subject).cloned())
    }

    async fn upsert(&self, snapshot: CacheSnapshot) -> JobResult<()> {
        self.rows
            .write()
            .await
            .insert(snapshot.subject.clone(), snapshot);
        Ok(())
    }

    async fn delete(&self, subject: &str) -> JobResult<bool> {
        Ok(self.rows.write().await.remove(subject).is_some())
    }
}
