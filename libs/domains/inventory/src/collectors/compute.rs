use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;

use super::{CollectContext, ServiceCollector};
use crate::cloud_api::{InstanceDescriptor, SubnetDescriptor};
use crate::error::{InventoryError, InventoryResult};
use crate::models::{Instance, InstanceState, Network, Resource, ResourceId, ResourceKind, Scope, Subnet};

pub const SERVICE: &str = "ec2";

/// Instances, VPCs and subnets of one region
pub struct ComputeCollector {
    region: String,
}

impl ComputeCollector {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
        }
    }

    fn id(&self, ctx: &CollectContext, kind: ResourceKind, local_id: &str) -> ResourceId {
        ResourceId::regional(ctx.provider, SERVICE, &self.region, &ctx.account_id, kind, local_id)
    }

    fn fail(&self, cause: impl std::fmt::Display) -> InventoryError {
        InventoryError::collector(SERVICE, &self.region, cause)
    }

    /// Every instance in the region, priced
    pub async fn list_instances(&self, ctx: &CollectContext) -> InventoryResult<Vec<Instance>> {
        let descriptors = ctx
            .api
            .describe_instances(&self.region, &[])
            .await
            .map_err(|e| self.fail(e))?;

        let mut instances = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let Some(mut instance) = self.instance(ctx, descriptor) else {
                continue;
            };
            instance.hourly_price = ctx.pricing.instance_hourly(&instance.instance_type).await;
            instances.push(instance);
        }

        tracing::debug!(region = %self.region, count = instances.len(), "Listed instances");
        Ok(instances)
    }

    fn instance(&self, ctx: &CollectContext, descriptor: InstanceDescriptor) -> Option<Instance> {
        let Some(instance_id) = descriptor.instance_id else {
            tracing::warn!(region = %self.region, "Skipping instance without an id");
            return None;
        };

        Some(Instance {
            id: self.id(ctx, ResourceKind::Instance, &instance_id),
            instance_type: descriptor.instance_type.unwrap_or_default(),
            state: InstanceState::parse(descriptor.state.as_deref().unwrap_or("unknown")),
            vpc_id: descriptor.vpc_id,
            subnet_id: descriptor.subnet_id,
            launch_time: descriptor.launch_time,
            public_address: descriptor.public_ip_address,
            hourly_price: None,
            instance_id,
        })
    }

    /// Attach the instances whose subnet id matches; each subnet id is claimed once
    fn subnet(
        &self,
        ctx: &CollectContext,
        descriptor: SubnetDescriptor,
        vpc_id: &str,
        instances: &[Arc<Instance>],
        claimed: &mut HashSet<String>,
    ) -> Option<Subnet> {
        let subnet_id = descriptor.subnet_id?;
        if !claimed.insert(subnet_id.clone()) {
            tracing::warn!(region = %self.region, subnet_id = %subnet_id, "Duplicate subnet ignored");
            return None;
        }

        let members = instances
            .iter()
            .filter(|i| i.subnet_id.as_deref() == Some(subnet_id.as_str()))
            .cloned()
            .collect();

        Some(Subnet {
            id: self.id(ctx, ResourceKind::Subnet, &subnet_id),
            vpc_id: descriptor.vpc_id.unwrap_or_else(|| vpc_id.to_string()),
            availability_zone: descriptor.availability_zone,
            instances: members,
            subnet_id,
        })
    }
}

#[async_trait]
impl ServiceCollector for ComputeCollector {
    fn service(&self) -> &'static str {
        SERVICE
    }

    fn scope(&self) -> Scope {
        Scope::Regional(self.region.clone())
    }

    async fn collect(&self, ctx: &CollectContext) -> InventoryResult<Vec<Resource>> {
        let (instances, vpcs) = futures::try_join!(
            self.list_instances(ctx),
            async {
                ctx.api
                    .describe_vpcs(&self.region)
                    .await
                    .map_err(|e| self.fail(e))
            }
        )?;
        let instances: Vec<Arc<Instance>> = instances.into_iter().map(Arc::new).collect();

        let subnet_lists = try_join_all(vpcs.iter().map(|vpc| async move {
            match vpc.vpc_id.as_deref() {
                Some(vpc_id) => ctx
                    .api
                    .describe_subnets(&self.region, vpc_id)
                    .await
                    .map_err(|e| self.fail(e)),
                None => Ok(Vec::new()),
            }
        }))
        .await?;

        let mut claimed = HashSet::new();
        let mut resources = Vec::new();
        for (vpc, subnets) in vpcs.into_iter().zip(subnet_lists) {
            let Some(vpc_id) = vpc.vpc_id else {
                tracing::warn!(region = %self.region, "Skipping VPC without an id");
                continue;
            };
            let subnets = subnets
                .into_iter()
                .filter_map(|s| self.subnet(ctx, s, &vpc_id, &instances, &mut claimed))
                .collect();

            resources.push(Resource::Network(Network {
                id: self.id(ctx, ResourceKind::Vpc, &vpc_id),
                is_default: vpc.is_default.unwrap_or(false),
                state: vpc.state.unwrap_or_else(|| "unknown".to_string()),
                subnets,
                vpc_id,
            }));
        }

        // Instances outside every collected subnet are still reported
        resources.extend(
            instances
                .into_iter()
                .filter(|i| !i.subnet_id.as_ref().is_some_and(|s| claimed.contains(s)))
                .map(Resource::Instance),
        );

        Ok(resources)
    }
}
