//! `CloudApi` backed by a static JSON document, for offline runs and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::cloud_api::{
    ApiError, ApiResult, BucketDescriptor, CloudApi, CloudApiFactory, CostMonthDescriptor,
    Credentials, InstanceDescriptor, InstanceStatusDescriptor, LaunchSpec, ObjectDescriptor,
    PriceFilter, SubnetDescriptor, VpcDescriptor,
};
use crate::error::{InventoryError, InventoryResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionFixture {
    #[serde(default)]
    pub instances: Vec<InstanceDescriptor>,
    #[serde(default)]
    pub instance_statuses: Vec<InstanceStatusDescriptor>,
    #[serde(default)]
    pub vpcs: Vec<VpcDescriptor>,
    #[serde(default)]
    pub subnets: Vec<SubnetDescriptor>,
    /// Launch result per `Name` tag; names not listed here cannot be launched
    #[serde(default)]
    pub launches: BTreeMap<String, InstanceDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketFixture {
    #[serde(flatten)]
    pub bucket: BucketDescriptor,
    #[serde(default)]
    pub objects: Vec<ObjectDescriptor>,
    /// Text contents by key; a listed object without one is empty
    #[serde(default)]
    pub bodies: BTreeMap<String, String>,
}

/// A catalog entry: every filter field listed here must match the request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFixture {
    pub service_code: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureDocument {
    pub account_id: String,
    #[serde(default)]
    pub regions: BTreeMap<String, RegionFixture>,
    #[serde(default)]
    pub buckets: Vec<BucketFixture>,
    #[serde(default)]
    pub prices: Vec<PriceFixture>,
    #[serde(default)]
    pub costs: Vec<CostMonthDescriptor>,
}

/// Static account snapshot with optional injected failures.
///
/// Failure keys are the operation name, optionally suffixed with the region
/// or bucket: `describe_instances:eu-central-1`, `list_buckets`.
#[derive(Debug, Clone, Default)]
pub struct StaticCloudApi {
    document: FixtureDocument,
    failures: HashSet<String>,
}

impl StaticCloudApi {
    pub fn new(document: FixtureDocument) -> Self {
        Self {
            document,
            failures: HashSet::new(),
        }
    }

    pub fn from_json(raw: &str) -> InventoryResult<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> InventoryResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| InventoryError::Parse(format!("fixture {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn with_failure(mut self, key: impl Into<String>) -> Self {
        self.failures.insert(key.into());
        self
    }

    pub fn document(&self) -> &FixtureDocument {
        &self.document
    }

    fn check(&self, operation: &str, target: Option<&str>) -> ApiResult<()> {
        let scoped = target.map(|t| format!("{operation}:{t}"));
        if self.failures.contains(operation)
            || scoped.is_some_and(|key| self.failures.contains(&key))
        {
            return Err(ApiError::Status {
                status: 503,
                message: format!("{operation} unavailable"),
            });
        }
        Ok(())
    }

    fn bucket(&self, name: &str) -> ApiResult<&BucketFixture> {
        self.document
            .buckets
            .iter()
            .find(|b| b.bucket.name.as_deref() == Some(name))
            .ok_or_else(|| ApiError::NotFound(format!("bucket {name}")))
    }

    fn region(&self, region: &str) -> RegionFixture {
        self.document.regions.get(region).cloned().unwrap_or_default()
    }
}

/// Catalog entry in the provider's on-demand term layout
fn price_entry(fixture: &PriceFixture) -> serde_json::Value {
    serde_json::json!({
        "product": { "attributes": fixture.attributes },
        "terms": {
            "OnDemand": {
                "FIXTURE.TERM": {
                    "priceDimensions": {
                        "FIXTURE.TERM.DIM": {
                            "unit": "Hrs",
                            "pricePerUnit": { "USD": format!("{:.10}", fixture.usd) }
                        }
                    }
                }
            }
        }
    })
}

#[async_trait]
impl CloudApi for StaticCloudApi {
    async fn caller_identity(&self) -> ApiResult<String> {
        self.check("caller_identity", None)?;
        Ok(self.document.account_id.clone())
    }

    async fn describe_instances(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> ApiResult<Vec<InstanceDescriptor>> {
        self.check("describe_instances", Some(region))?;
        Ok(self
            .region(region)
            .instances
            .into_iter()
            .filter(|i| {
                instance_ids.is_empty()
                    || i.instance_id.as_ref().is_some_and(|id| instance_ids.contains(id))
            })
            .collect())
    }

    async fn describe_instance_status(
        &self,
        region: &str,
        instance_id: &str,
    ) -> ApiResult<Option<InstanceStatusDescriptor>> {
        self.check("describe_instance_status", Some(region))?;
        Ok(self
            .region(region)
            .instance_statuses
            .into_iter()
            .find(|s| s.instance_id.as_deref() == Some(instance_id)))
    }

    async fn describe_vpcs(&self, region: &str) -> ApiResult<Vec<VpcDescriptor>> {
        self.check("describe_vpcs", Some(region))?;
        Ok(self.region(region).vpcs)
    }

    async fn describe_subnets(
        &self,
        region: &str,
        vpc_id: &str,
    ) -> ApiResult<Vec<SubnetDescriptor>> {
        self.check("describe_subnets", Some(region))?;
        Ok(self
            .region(region)
            .subnets
            .into_iter()
            .filter(|s| s.vpc_id.as_deref() == Some(vpc_id))
            .collect())
    }

    async fn list_buckets(&self) -> ApiResult<Vec<BucketDescriptor>> {
        self.check("list_buckets", None)?;
        Ok(self.document.buckets.iter().map(|b| b.bucket.clone()).collect())
    }

    async fn list_objects(&self, bucket: &str) -> ApiResult<Vec<ObjectDescriptor>> {
        self.check("list_objects", Some(bucket))?;
        Ok(self.bucket(bucket)?.objects.clone())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ApiResult<Vec<u8>> {
        self.check("get_object", Some(bucket))?;
        let fixture = self.bucket(bucket)?;
        if !fixture.objects.iter().any(|o| o.key.as_deref() == Some(key)) {
            return Err(ApiError::NotFound(format!("{bucket}/{key}")));
        }
        Ok(fixture
            .bodies
            .get(key)
            .map(|body| body.as_bytes().to_vec())
            .unwrap_or_default())
    }

    async fn run_instance(
        &self,
        region: &str,
        spec: &LaunchSpec,
    ) -> ApiResult<InstanceDescriptor> {
        self.check("run_instance", Some(region))?;
        self.region(region)
            .launches
            .remove(&spec.name)
            .ok_or_else(|| ApiError::Status {
                status: 400,
                message: format!("no launch of '{}' in {region}", spec.name),
            })
    }

    async fn get_products(
        &self,
        service_code: &str,
        filters: &[PriceFilter],
    ) -> ApiResult<Vec<serde_json::Value>> {
        self.check("get_products", Some(service_code))?;
        Ok(self
            .document
            .prices
            .iter()
            .filter(|p| p.service_code == service_code)
            .filter(|p| {
                filters
                    .iter()
                    .all(|f| p.attributes.get(&f.field) == Some(&f.value))
            })
            .map(price_entry)
            .collect())
    }

    async fn monthly_costs(&self, months: u32) -> ApiResult<Vec<CostMonthDescriptor>> {
        self.check("monthly_costs", None)?;
        let costs = &self.document.costs;
        let skip = costs.len().saturating_sub(months as usize);
        Ok(costs[skip..].to_vec())
    }
}

/// Hands out the same static account for any credentials
impl CloudApiFactory for StaticCloudApi {
    fn connect(&self, _credentials: &Credentials) -> ApiResult<Arc<dyn CloudApi>> {
        Ok(Arc::new(self.clone()))
    }
}
