//! Uniform recursive rendering of heterogeneous resources.
//!
//! Every resource becomes one [`ResultNode`]: a name, a kind and an ordered
//! list of fields, each either a string or a nested list of nodes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Bucket, BucketObject, Instance, Network, Resource, ResourceKind, Subnet};

pub const COLLECTION_KIND: &str = "collection";
pub const COLLECTOR_ERROR_KIND: &str = "collector_error";
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Field {
    String { name: String, value: String },
    Items { name: String, value: Vec<ResultNode> },
}

impl Field {
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Field::String {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn items(name: &str, value: Vec<ResultNode>) -> Self {
        Field::Items {
            name: name.to_string(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Field::String { name, .. } | Field::Items { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNode {
    pub name: String,
    pub item_type: String,
    pub fields: Vec<Field>,
}

impl ResultNode {
    pub fn new(name: impl Into<String>, item_type: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            item_type: item_type.into(),
            fields,
        }
    }

    /// Node listing everything one collector produced in one scope
    pub fn collection(service: &str, items: Vec<ResultNode>) -> Self {
        Self::new(service, COLLECTION_KIND, vec![Field::items("Items", items)])
    }

    /// Marker for a scope/service slice whose collector failed
    pub fn collector_error(service: &str, cause: &str) -> Self {
        Self::new(
            service,
            COLLECTOR_ERROR_KIND,
            vec![Field::string("Service", service), Field::string("Error", cause)],
        )
    }

    pub fn is_error(&self) -> bool {
        self.item_type == COLLECTOR_ERROR_KIND
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            Field::String { value, .. } => Some(value),
            Field::Items { .. } => None,
        }
    }

    pub fn items(&self, name: &str) -> Option<&[ResultNode]> {
        match self.field(name)? {
            Field::Items { value, .. } => Some(value),
            Field::String { .. } => None,
        }
    }
}

pub trait ToResultNode {
    fn to_node(&self) -> ResultNode;
}

impl ToResultNode for Instance {
    fn to_node(&self) -> ResultNode {
        ResultNode::new(
            self.id.as_str(),
            ResourceKind::Instance.to_string(),
            vec![
                Field::string("Instance ID", &self.instance_id),
                Field::string("Instance type", &self.instance_type),
                Field::string("State", self.state.as_str()),
                Field::string("Subnet ID", optional(self.subnet_id.as_deref())),
                Field::string("Vpc ID", optional(self.vpc_id.as_deref())),
                Field::string("Launch time", timestamp(self.launch_time)),
                Field::string("Price per month", price(self.monthly_price())),
            ],
        )
    }
}

impl ToResultNode for Subnet {
    fn to_node(&self) -> ResultNode {
        let mut fields = vec![
            Field::string("Subnet ID", &self.subnet_id),
            Field::string("VPC ID", &self.vpc_id),
            Field::string("Availability zone", optional(self.availability_zone.as_deref())),
        ];
        if !self.instances.is_empty() {
            fields.push(Field::items(
                "EC2 Instances",
                self.instances.iter().map(|i| i.to_node()).collect(),
            ));
        }

        ResultNode::new(self.id.as_str(), ResourceKind::Subnet.to_string(), fields)
    }
}

impl ToResultNode for Network {
    fn to_node(&self) -> ResultNode {
        ResultNode::new(
            self.id.as_str(),
            ResourceKind::Vpc.to_string(),
            vec![
                Field::string("ID", &self.vpc_id),
                Field::string("Is default", self.is_default.to_string()),
                Field::string("State", &self.state),
                Field::items("Subnets", self.subnets.iter().map(|s| s.to_node()).collect()),
            ],
        )
    }
}

impl ToResultNode for BucketObject {
    fn to_node(&self) -> ResultNode {
        ResultNode::new(
            &self.key,
            ResourceKind::BucketObject.to_string(),
            vec![
                Field::string("Size", human_size(self.size)),
                Field::string("Modified at", timestamp(self.last_modified)),
            ],
        )
    }
}

impl ToResultNode for Bucket {
    fn to_node(&self) -> ResultNode {
        ResultNode::new(
            self.id.as_str(),
            ResourceKind::Bucket.to_string(),
            vec![
                Field::string("Name", &self.name),
                Field::string("Created at", timestamp(self.created_at)),
                Field::string("Size", human_size(self.size())),
                Field::string("Price per month", price(self.monthly_price())),
                Field::items(
                    "Contents",
                    self.objects_by_size().into_iter().map(|o| o.to_node()).collect(),
                ),
            ],
        )
    }
}

impl ToResultNode for Resource {
    fn to_node(&self) -> ResultNode {
        match self {
            Resource::Instance(instance) => instance.to_node(),
            Resource::Network(network) => network.to_node(),
            Resource::Bucket(bucket) => bucket.to_node(),
        }
    }
}

/// `"{amount rounded to cents} $"`, or `"unknown"` for an unpriced resource
pub fn price(amount: Option<f64>) -> String {
    match amount {
        Some(amount) => {
            let rounded = (amount * 100.0).round() / 100.0;
            if rounded.fract() == 0.0 {
                format!("{rounded:.1} $")
            } else {
                format!("{rounded} $")
            }
        }
        None => UNKNOWN.to_string(),
    }
}

/// Decimal human readable size: `1 Byte`, `60 Bytes`, `1.5 kB`, `2.0 MB`
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

    match bytes {
        1 => "1 Byte".to_string(),
        b if b < 1000 => format!("{b} Bytes"),
        b => {
            let b = b as f64;
            let mut unit = 1000.0_f64;
            for suffix in UNITS {
                unit *= 1000.0;
                if b < unit {
                    return format!("{:.1} {}", b * 1000.0 / unit, suffix);
                }
            }
            format!("{:.1} {}", b * 1000.0 / unit, UNITS[UNITS.len() - 1])
        }
    }
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or(UNKNOWN).to_string()
}
