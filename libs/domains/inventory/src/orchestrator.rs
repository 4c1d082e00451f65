//! Runs every registered collector over every configured scope and merges
//! the results into one report keyed by scope and service.

use async_trait::async_trait;
use futures::future::join_all;
use observability::CollectionMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use crate::cloud_api::CloudApi;
use crate::collectors::{CollectContext, CollectorRegistry, ServiceCollector};
use crate::error::{InventoryError, InventoryResult};
use crate::models::{CloudProvider, Scope};
use crate::result_tree::{ResultNode, ToResultNode};

/// Merged output of one pass. Each scope owns its own subtree.
///
/// Regions and services are listed in lexical order, whatever order the
/// regions were configured in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub account_id: String,
    /// region → service → collection
    pub regional: BTreeMap<String, BTreeMap<String, ResultNode>>,
    /// service → collection
    pub global: BTreeMap<String, ResultNode>,
}

impl CollectionReport {
    /// `scope/service` of every slice whose collector failed
    pub fn failed_slices(&self) -> Vec<String> {
        let regional = self.regional.iter().flat_map(|(region, services)| {
            services
                .iter()
                .filter(|(_, node)| node.is_error())
                .map(move |(service, _)| format!("{region}/{service}"))
        });
        let global = self
            .global
            .iter()
            .filter(|(_, node)| node.is_error())
            .map(|(service, _)| format!("global/{service}"));

        regional.chain(global).collect()
    }

    pub fn service(&self, scope: &Scope, service: &str) -> Option<&ResultNode> {
        match scope {
            Scope::Regional(region) => self.regional.get(region)?.get(service),
            Scope::Global => self.global.get(service),
        }
    }
}

/// Notified as each scope of a pass completes
#[async_trait]
pub trait CollectionObserver: Send + Sync {
    async fn scope_finished(&self, scope: &Scope, failed_services: Vec<String>);
}

pub struct NoopObserver;

#[async_trait]
impl CollectionObserver for NoopObserver {
    async fn scope_finished(&self, _scope: &Scope, _failed_services: Vec<String>) {}
}

pub struct CollectionOrchestrator {
    registry: CollectorRegistry,
    regions: Vec<String>,
    provider: CloudProvider,
}

impl CollectionOrchestrator {
    /// Regions keep their declared order; duplicates are dropped
    pub fn new(registry: CollectorRegistry, regions: Vec<String>, provider: CloudProvider) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(regions.len());
        for region in regions {
            if !unique.contains(&region) {
                unique.push(region);
            }
        }

        Self {
            registry,
            regions: unique,
            provider,
        }
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    /// Establish the account identity and the pass-wide pricing resolver
    pub async fn prepare(&self, api: Arc<dyn CloudApi>) -> InventoryResult<CollectContext> {
        let account_id = api.caller_identity().await.map_err(|e| {
            if e.is_auth_failure() {
                InventoryError::Credentials(e.to_string())
            } else {
                InventoryError::Api(e)
            }
        })?;

        Ok(CollectContext::new(self.provider, account_id, api))
    }

    pub async fn collect_all(&self, api: Arc<dyn CloudApi>) -> InventoryResult<CollectionReport> {
        let ctx = self.prepare(api).await?;
        Ok(self.collect_with(&ctx, &NoopObserver).await)
    }

    /// Collect every scope; collector failures become error nodes in their slice
    #[instrument(skip(self, ctx, observer), fields(account_id = %ctx.account_id))]
    pub async fn collect_with(
        &self,
        ctx: &CollectContext,
        observer: &dyn CollectionObserver,
    ) -> CollectionReport {
        let started = Instant::now();

        let regional_pass = join_all(self.regions.iter().map(|region| async move {
            let services = self.collect_region(ctx, region).await;
            observer
                .scope_finished(&Scope::Regional(region.clone()), failed(&services))
                .await;
            (region.clone(), services)
        }));
        let global_pass = async {
            let services = self.collect_global(ctx).await;
            observer.scope_finished(&Scope::Global, failed(&services)).await;
            services
        };

        let (regional, global) = futures::join!(regional_pass, global_pass);

        let report = CollectionReport {
            account_id: ctx.account_id.clone(),
            regional: regional.into_iter().collect(),
            global,
        };

        let elapsed = started.elapsed();
        CollectionMetrics::record_pass(elapsed.as_secs_f64());
        tracing::info!(
            regions = self.regions.len(),
            failed_slices = report.failed_slices().len(),
            duration_ms = elapsed.as_millis() as u64,
            "Collection pass finished"
        );

        report
    }

    pub async fn collect_region(
        &self,
        ctx: &CollectContext,
        region: &str,
    ) -> BTreeMap<String, ResultNode> {
        let collectors = self.registry.regional_for(region);
        join_all(collectors.iter().map(|c| run_slice(ctx, c.as_ref())))
            .await
            .into_iter()
            .collect()
    }

    pub async fn collect_global(&self, ctx: &CollectContext) -> BTreeMap<String, ResultNode> {
        let collectors = self.registry.global();
        join_all(collectors.iter().map(|c| run_slice(ctx, c.as_ref())))
            .await
            .into_iter()
            .collect()
    }
}

async fn run_slice(ctx: &CollectContext, collector: &dyn ServiceCollector) -> (String, ResultNode) {
    let service = collector.service();
    let scope = collector.scope();

    match collector.collect(ctx).await {
        Ok(resources) => {
            CollectionMetrics::record_slice(service, scope.label(), resources.len());
            let items = resources.iter().map(|r| r.to_node()).collect();
            (service.to_string(), ResultNode::collection(service, items))
        }
        Err(e) => {
            CollectionMetrics::record_slice_failure(service, scope.label());
            tracing::warn!(service, scope = %scope, error = %e, "Collector failed; slice isolated");
            (
                service.to_string(),
                ResultNode::collector_error(service, &e.to_string()),
            )
        }
    }
}

fn failed(services: &BTreeMap<String, ResultNode>) -> Vec<String> {
    services
        .iter()
        .filter(|(_, node)| node.is_error())
        .map(|(service, _)| service.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_api::{ApiError, MockCloudApi};
    use crate::models::Resource;
    use std::sync::Mutex;

    struct FixedCollector {
        service: &'static str,
        scope: Scope,
        fail: bool,
    }

    #[async_trait]
    impl ServiceCollector for FixedCollector {
        fn service(&self) -> &'static str {
            self.service
        }

        fn scope(&self) -> Scope {
            self.scope.clone()
        }

        async fn collect(&self, _ctx: &CollectContext) -> InventoryResult<Vec<Resource>> {
            if self.fail {
                return Err(InventoryError::collector(self.service, self.scope.label(), "boom"));
            }
            Ok(vec![])
        }
    }

    fn registry() -> CollectorRegistry {
        let mut registry = CollectorRegistry::new();
        registry.register_regional("good", |region| {
            Box::new(FixedCollector {
                service: "good",
                scope: Scope::Regional(region.to_string()),
                fail: false,
            })
        });
        registry.register_regional("flaky", |region| {
            Box::new(FixedCollector {
                service: "flaky",
                scope: Scope::Regional(region.to_string()),
                fail: region == "us-east-1",
            })
        });
        registry.register_global("shared", || {
            Box::new(FixedCollector {
                service: "shared",
                scope: Scope::Global,
                fail: false,
            })
        });
        registry
    }

    fn api() -> Arc<dyn CloudApi> {
        let mut api = MockCloudApi::new();
        api.expect_caller_identity()
            .returning(|| Ok("123456789012".to_string()));
        Arc::new(api)
    }

    struct Recorder(Mutex<Vec<(String, Vec<String>)>>);

    #[async_trait]
    impl CollectionObserver for Recorder {
        async fn scope_finished(&self, scope: &Scope, failed_services: Vec<String>) {
            self.0
                .lock()
                .unwrap()
                .push((scope.label().to_string(), failed_services));
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_slice() {
        let orchestrator = CollectionOrchestrator::new(
            registry(),
            vec!["eu-central-1".into(), "us-east-1".into()],
            CloudProvider::Aws,
        );
        let report = orchestrator.collect_all(api()).await.unwrap();

        assert_eq!(report.account_id, "123456789012");
        assert_eq!(report.regional.len(), 2);
        assert_eq!(report.failed_slices(), vec!["us-east-1/flaky"]);
        assert!(!report.regional["eu-central-1"]["flaky"].is_error());
        assert!(!report.regional["us-east-1"]["good"].is_error());
        assert_eq!(report.global["shared"].item_type, "collection");
    }

    #[tokio::test]
    async fn test_observer_sees_every_scope() {
        let orchestrator = CollectionOrchestrator::new(
            registry(),
            vec!["us-east-1".into(), "us-east-1".into()],
            CloudProvider::Aws,
        );
        assert_eq!(orchestrator.regions(), ["us-east-1".to_string()]);

        let ctx = orchestrator.prepare(api()).await.unwrap();
        let recorder = Recorder(Mutex::new(Vec::new()));
        orchestrator.collect_with(&ctx, &recorder).await;

        let mut seen = recorder.0.into_inner().unwrap();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("global".to_string(), vec![]),
                ("us-east-1".to_string(), vec!["flaky".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_identity_is_a_credentials_error() {
        let mut api = MockCloudApi::new();
        api.expect_caller_identity().returning(|| {
            Err(ApiError::Status {
                status: 401,
                message: "InvalidClientTokenId".into(),
            })
        });

        let orchestrator =
            CollectionOrchestrator::new(registry(), vec!["eu-central-1".into()], CloudProvider::Aws);
        let err = orchestrator.collect_all(Arc::new(api)).await.unwrap_err();
        assert!(matches!(err, InventoryError::Credentials(_)));
    }
}
