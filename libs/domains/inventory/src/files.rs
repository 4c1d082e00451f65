//! Read access to object storage: bucket names, keys and object contents.

use std::sync::Arc;
use tracing::instrument;

use crate::cloud_api::CloudApi;
use crate::error::InventoryResult;

/// Object storage of one account
#[derive(Clone)]
pub struct FileStorage {
    api: Arc<dyn CloudApi>,
}

impl FileStorage {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    /// Names of every bucket, in the order the provider lists them
    #[instrument(skip(self))]
    pub async fn bucket_names(&self) -> InventoryResult<Vec<String>> {
        let buckets = self.api.list_buckets().await?;
        Ok(buckets.into_iter().filter_map(|b| b.name).collect())
    }

    #[instrument(skip(self))]
    pub async fn file_keys(&self, bucket: &str) -> InventoryResult<Vec<String>> {
        let objects = self.api.list_objects(bucket).await?;
        Ok(objects.into_iter().filter_map(|o| o.key).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_file(&self, bucket: &str, key: &str) -> InventoryResult<Vec<u8>> {
        let body = self.api.get_object(bucket, key).await?;
        tracing::debug!(bytes = body.len(), "Object fetched");
        Ok(body)
    }
}
