//! The cloud provider as an opaque network collaborator.
//!
//! Descriptors mirror what the provider reports; every field it may omit is
//! an `Option` so a sparse record never fails a whole pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloud API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ApiError {
    /// The provider rejected the credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceDescriptor {
    pub instance_id: Option<String>,
    pub instance_type: Option<String>,
    pub state: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub launch_time: Option<DateTime<Utc>>,
    pub public_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceStatusDescriptor {
    pub instance_id: Option<String>,
    pub instance_state: Option<String>,
    pub instance_status: Option<String>,
    pub system_status: Option<String>,
}

impl InstanceStatusDescriptor {
    /// Running with both reachability checks passing
    pub fn is_initialized(&self) -> bool {
        self.instance_state.as_deref() == Some("running")
            && self.instance_status.as_deref() == Some("ok")
            && self.system_status.as_deref() == Some("ok")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcDescriptor {
    pub vpc_id: Option<String>,
    pub is_default: Option<bool>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetDescriptor {
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketDescriptor {
    pub name: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectDescriptor {
    pub key: Option<String>,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Exact-match price catalog filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PriceFilter {
    #[serde(rename = "Type")]
    pub match_type: String,
    pub field: String,
    pub value: String,
}

impl PriceFilter {
    pub fn term_match(field: &str, value: &str) -> Self {
        Self {
            match_type: "TERM_MATCH".to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// A single instance to launch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchSpec {
    /// Value of the `Name` tag
    pub name: String,
    pub instance_type: String,
    /// Provider default image when unset
    #[serde(default)]
    pub image_id: Option<String>,
    pub user_data: String,
}

/// Closed billing month by cost category, in USD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CostMonthDescriptor {
    /// `YYYY-MM`
    pub month: Option<String>,
    pub compute: Option<f64>,
    pub block_storage: Option<f64>,
    pub object_storage: Option<f64>,
}

/// One client per account; every call is fallible and network bound
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Account id of the credentials in use
    async fn caller_identity(&self) -> ApiResult<String>;

    /// Instances in a region; an empty `instance_ids` lists all of them
    async fn describe_instances(
        &self,
        region: &str,
        instance_ids: &[String],
    ) -> ApiResult<Vec<InstanceDescriptor>>;

    /// `None` while the provider reports no status for the instance, which
    /// covers both a freshly launched and a terminated one
    async fn describe_instance_status(
        &self,
        region: &str,
        instance_id: &str,
    ) -> ApiResult<Option<InstanceStatusDescriptor>>;

    async fn describe_vpcs(&self, region: &str) -> ApiResult<Vec<VpcDescriptor>>;

    async fn describe_subnets(&self, region: &str, vpc_id: &str)
    -> ApiResult<Vec<SubnetDescriptor>>;

    async fn list_buckets(&self) -> ApiResult<Vec<BucketDescriptor>>;

    async fn list_objects(&self, bucket: &str) -> ApiResult<Vec<ObjectDescriptor>>;

    /// Raw contents of one object
    async fn get_object(&self, bucket: &str, key: &str) -> ApiResult<Vec<u8>>;

    /// Launch one instance; the descriptor is as reported right after launch
    async fn run_instance(&self, region: &str, spec: &LaunchSpec)
    -> ApiResult<InstanceDescriptor>;

    /// Raw price list entries matching every filter
    async fn get_products(
        &self,
        service_code: &str,
        filters: &[PriceFilter],
    ) -> ApiResult<Vec<serde_json::Value>>;

    /// Closed months, oldest first
    async fn monthly_costs(&self, months: u32) -> ApiResult<Vec<CostMonthDescriptor>>;
}

/// Builds an account client from caller-supplied credentials
pub trait CloudApiFactory: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> ApiResult<Arc<dyn CloudApi>>;
}
