use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Hourly price projected over a fixed 31-day month
pub fn monthly_from_hourly(hourly: f64) -> f64 {
    hourly * 24.0 * 31.0
}

/// Bytes to binary gigabytes
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 * 2f64.powi(-30)
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Aws,
}

/// Where a collector enumerates resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Regional(String),
    Global,
}

impl Scope {
    pub fn region(&self) -> Option<&str> {
        match self {
            Scope::Regional(region) => Some(region),
            Scope::Global => None,
        }
    }

    pub fn label(&self) -> &str {
        self.region().unwrap_or("global")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Instance,
    Subnet,
    Vpc,
    Bucket,
    BucketObject,
}

/// Canonical resource identifier, derived only from scope, account and local id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// `arn:{provider}:{service}:{region}:{account}:{kind}/{local_id}`
    pub fn regional(
        provider: CloudProvider,
        service: &str,
        region: &str,
        account_id: &str,
        kind: ResourceKind,
        local_id: &str,
    ) -> Self {
        Self(format!(
            "arn:{provider}:{service}:{region}:{account_id}:{kind}/{local_id}"
        ))
    }

    /// Buckets are named globally: `arn:{provider}:s3:::{name}`
    pub fn bucket(provider: CloudProvider, name: &str) -> Self {
        Self(format!("arn:{provider}:s3:::{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
    Other(String),
}

impl InstanceState {
    pub fn parse(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "terminated" => Self::Terminated,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: ResourceId,
    pub instance_id: String,
    pub instance_type: String,
    pub state: InstanceState,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub launch_time: Option<DateTime<Utc>>,
    pub public_address: Option<String>,
    /// `None` until priced, and when no catalog entry matches
    pub hourly_price: Option<f64>,
}

impl Instance {
    pub fn monthly_price(&self) -> Option<f64> {
        self.hourly_price.map(monthly_from_hourly)
    }

    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub id: ResourceId,
    pub subnet_id: String,
    pub vpc_id: String,
    pub availability_zone: Option<String>,
    /// Instances of the pass whose subnet id matches; shared, not owned
    pub instances: Vec<Arc<Instance>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub id: ResourceId,
    pub vpc_id: String,
    pub is_default: bool,
    pub state: String,
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub id: ResourceId,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub hourly_price: Option<f64>,
    pub objects: Vec<BucketObject>,
}

impl Bucket {
    pub fn size(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }

    pub fn size_gb(&self) -> f64 {
        bytes_to_gb(self.size())
    }

    pub fn monthly_price(&self) -> Option<f64> {
        self.hourly_price.map(monthly_from_hourly)
    }

    /// Objects by descending size, key ascending on ties
    pub fn objects_by_size(&self) -> Vec<&BucketObject> {
        let mut objects: Vec<&BucketObject> = self.objects.iter().collect();
        objects.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.key.cmp(&b.key)));
        objects
    }
}

/// Top-level resource produced by a collector
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// An instance not attached to any collected subnet
    Instance(Arc<Instance>),
    Network(Network),
    Bucket(Bucket),
}

impl Resource {
    pub fn id(&self) -> &ResourceId {
        match self {
            Resource::Instance(instance) => &instance.id,
            Resource::Network(network) => &network.id,
            Resource::Bucket(bucket) => &bucket.id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Instance(_) => ResourceKind::Instance,
            Resource::Network(_) => ResourceKind::Vpc,
            Resource::Bucket(_) => ResourceKind::Bucket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str, size: u64) -> BucketObject {
        BucketObject {
            key: key.into(),
            size,
            last_modified: None,
        }
    }

    #[test]
    fn test_identifiers_are_deterministic() {
        let a = ResourceId::regional(
            CloudProvider::Aws,
            "ec2",
            "eu-central-1",
            "123456789012",
            ResourceKind::Instance,
            "i-0abc",
        );
        let b = ResourceId::regional(
            CloudProvider::Aws,
            "ec2",
            "eu-central-1",
            "123456789012",
            ResourceKind::Instance,
            "i-0abc",
        );
        assert_eq!(a, b);
        assert_eq!(
            a.as_str(),
            "arn:aws:ec2:eu-central-1:123456789012:instance/i-0abc"
        );
        assert_eq!(
            ResourceId::bucket(CloudProvider::Aws, "logs").as_str(),
            "arn:aws:s3:::logs"
        );
    }

    #[test]
    fn test_monthly_price_uses_fixed_month() {
        assert_eq!(monthly_from_hourly(0.10), 0.10 * 24.0 * 31.0);
        assert_eq!(monthly_from_hourly(1.0), 744.0);
    }

    #[test]
    fn test_bucket_size_and_ordering() {
        let empty = Bucket {
            id: ResourceId::bucket(CloudProvider::Aws, "empty"),
            name: "empty".into(),
            created_at: None,
            hourly_price: None,
            objects: vec![],
        };
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.monthly_price(), None);

        let full = Bucket {
            objects: vec![object("b", 20), object("a", 30), object("c", 10), object("d", 20)],
            ..empty
        };
        assert_eq!(full.size(), 80);
        let keys: Vec<&str> = full.objects_by_size().iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_instance_state_parse() {
        assert_eq!(InstanceState::parse("running"), InstanceState::Running);
        assert_eq!(
            InstanceState::parse("shutting-down"),
            InstanceState::Other("shutting-down".into())
        );
        assert_eq!(InstanceState::parse("shutting-down").to_string(), "shutting-down");
    }
}
