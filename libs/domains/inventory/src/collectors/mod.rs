//! Service collectors and their registry.
//!
//! A collector enumerates one resource kind in one scope. Regional
//! collectors are built per region, global ones once per account; the
//! orchestrator only ever sees the registry.

pub mod compute;
pub mod storage;

use async_trait::async_trait;
use std::sync::Arc;

use crate::cloud_api::CloudApi;
use crate::error::InventoryResult;
use crate::models::{CloudProvider, Resource, Scope};
use crate::pricing::PricingResolver;

pub use compute::ComputeCollector;
pub use storage::StorageCollector;

/// Shared, read-only state of one collection pass
#[derive(Clone)]
pub struct CollectContext {
    pub provider: CloudProvider,
    pub account_id: String,
    pub api: Arc<dyn CloudApi>,
    pub pricing: Arc<PricingResolver>,
}

impl CollectContext {
    pub fn new(provider: CloudProvider, account_id: impl Into<String>, api: Arc<dyn CloudApi>) -> Self {
        Self {
            provider,
            account_id: account_id.into(),
            pricing: Arc::new(PricingResolver::new(api.clone())),
            api,
        }
    }
}

#[async_trait]
pub trait ServiceCollector: Send + Sync {
    /// Service name, used as the key in the merged report
    fn service(&self) -> &'static str;

    fn scope(&self) -> Scope;

    /// Enumerate and price every resource of this service in this scope.
    ///
    /// Any collaborator failure fails the whole call; no partial lists.
    async fn collect(&self, ctx: &CollectContext) -> InventoryResult<Vec<Resource>>;
}

pub type RegionalFactory = Arc<dyn Fn(&str) -> Box<dyn ServiceCollector> + Send + Sync>;
pub type GlobalFactory = Arc<dyn Fn() -> Box<dyn ServiceCollector> + Send + Sync>;

/// Constructor table of collectors, keyed by scope kind
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    regional: Vec<(&'static str, RegionalFactory)>,
    global: Vec<(&'static str, GlobalFactory)>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute (regional) and object storage (global)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_regional(compute::SERVICE, |region| {
            Box::new(ComputeCollector::new(region))
        });
        registry.register_global(storage::SERVICE, || Box::new(StorageCollector));
        registry
    }

    /// Register a per-region collector; a second registration for a service replaces the first
    pub fn register_regional<F>(&mut self, service: &'static str, factory: F)
    where
        F: Fn(&str) -> Box<dyn ServiceCollector> + Send + Sync + 'static,
    {
        self.regional.retain(|(name, _)| *name != service);
        self.regional.push((service, Arc::new(factory)));
    }

    /// Register an account-wide collector; a second registration for a service replaces the first
    pub fn register_global<F>(&mut self, service: &'static str, factory: F)
    where
        F: Fn() -> Box<dyn ServiceCollector> + Send + Sync + 'static,
    {
        self.global.retain(|(name, _)| *name != service);
        self.global.push((service, Arc::new(factory)));
    }

    pub fn regional_for(&self, region: &str) -> Vec<Box<dyn ServiceCollector>> {
        self.regional.iter().map(|(_, factory)| factory(region)).collect()
    }

    pub fn global(&self) -> Vec<Box<dyn ServiceCollector>> {
        self.global.iter().map(|(_, factory)| factory()).collect()
    }

    pub fn regional_services(&self) -> Vec<&'static str> {
        self.regional.iter().map(|(name, _)| *name).collect()
    }

    pub fn global_services(&self) -> Vec<&'static str> {
        self.global.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.regional.is_empty() && self.global.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = CollectorRegistry::with_defaults();
        assert_eq!(registry.regional_services(), vec!["ec2"]);
        assert_eq!(registry.global_services(), vec!["s3"]);

        let collectors = registry.regional_for("eu-west-1");
        assert_eq!(collectors.len(), 1);
        assert_eq!(collectors[0].scope(), Scope::Regional("eu-west-1".into()));
        assert_eq!(registry.global()[0].scope(), Scope::Global);
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut registry = CollectorRegistry::with_defaults();
        registry.register_global(storage::SERVICE, || Box::new(StorageCollector));
        assert_eq!(registry.global_services().len(), 1);
        assert!(!registry.is_empty());
        assert!(CollectorRegistry::new().is_empty());
    }
}
