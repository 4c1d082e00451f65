use async_trait::async_trait;
use futures::future::try_join_all;

use super::{CollectContext, ServiceCollector};
use crate::cloud_api::BucketDescriptor;
use crate::error::{InventoryError, InventoryResult};
use crate::models::{Bucket, BucketObject, Resource, ResourceId, Scope};

pub const SERVICE: &str = "s3";

/// Buckets and their contents, account wide
pub struct StorageCollector;

impl StorageCollector {
    fn fail(cause: impl std::fmt::Display) -> InventoryError {
        InventoryError::collector(SERVICE, Scope::Global.label(), cause)
    }

    async fn bucket(
        ctx: &CollectContext,
        name: String,
        descriptor: BucketDescriptor,
    ) -> InventoryResult<Bucket> {
        let objects: Vec<BucketObject> = ctx
            .api
            .list_objects(&name)
            .await
            .map_err(Self::fail)?
            .into_iter()
            .filter_map(|o| {
                Some(BucketObject {
                    key: o.key?,
                    size: o.size.unwrap_or(0),
                    last_modified: o.last_modified,
                })
            })
            .collect();

        let mut bucket = Bucket {
            id: ResourceId::bucket(ctx.provider, &name),
            name,
            created_at: descriptor.creation_date,
            hourly_price: None,
            objects,
        };
        bucket.hourly_price = ctx.pricing.bucket_hourly(bucket.size_gb()).await;

        Ok(bucket)
    }

    /// Every bucket of the account with its contents, priced
    pub async fn list_buckets(ctx: &CollectContext) -> InventoryResult<Vec<Bucket>> {
        let descriptors = ctx.api.list_buckets().await.map_err(Self::fail)?;

        let buckets = try_join_all(descriptors.into_iter().filter_map(|descriptor| {
            let Some(name) = descriptor.name.clone() else {
                tracing::warn!("Skipping bucket without a name");
                return None;
            };
            Some(Self::bucket(ctx, name, descriptor))
        }))
        .await?;

        tracing::debug!(count = buckets.len(), "Listed buckets");
        Ok(buckets)
    }
}

#[async_trait]
impl ServiceCollector for StorageCollector {
    fn service(&self) -> &'static str {
        SERVICE
    }

    fn scope(&self) -> Scope {
        Scope::Global
    }

    async fn collect(&self, ctx: &CollectContext) -> InventoryResult<Vec<Resource>> {
        let buckets = Self::list_buckets(ctx).await?;
        Ok(buckets.into_iter().map(Resource::Bucket).collect())
    }
}
