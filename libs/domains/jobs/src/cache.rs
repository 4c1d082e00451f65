use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::JobResult;
use crate::models::CacheSnapshot;
use crate::repository::ResultCacheRepository;

/// Last completed result per subject. Last writer wins.
#[derive(Clone)]
pub struct ResultCache {
    repository: Arc<dyn ResultCacheRepository>,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(repository: Arc<dyn ResultCacheRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn save(&self, subject: &str, payload: serde_json::Value) -> JobResult<CacheSnapshot> {
        let snapshot = CacheSnapshot {
            subject: subject.to_string(),
            payload,
            saved_at: self.clock.now(),
        };
        self.repository.upsert(snapshot.clone()).await?;

        tracing::debug!(subject = %subject, "Cached result snapshot");
        Ok(snapshot)
    }

    pub async fn save_as<T: Serialize>(&self, subject: &str, value: &T) -> JobResult<CacheSnapshot> {
        self.save(subject, serde_json::to_value(value)?).await
    }

    pub async fn get(&self, subject: &str) -> JobResult<Option<CacheSnapshot>> {
        self.repository.get(subject).await
    }

    /// Read and decode the cached payload
    pub async fn get_as<T: DeserializeOwned>(&self, subject: &str) -> JobResult<Option<T>> {
        match self.repository.get(subject).await? {
            Some(snapshot) => Ok(Some(serde_json::from_value(snapshot.payload)?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, subject: &str) -> JobResult<bool> {
        self.repository.delete(subject).await
    }
}
