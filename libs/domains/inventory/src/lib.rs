//! Inventory Domain
//!
//! Enumerates the resources of a cloud account, prices them and renders the
//! result as a uniform tree that callers can display without knowing any
//! resource type.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ InventoryService │  ← get_status / get_cached_result / trigger_* / file_storage
//! └────────┬─────────┘
//!          │ JobRunner (domain_jobs)
//! ┌────────▼───────────────┐
//! │ CollectionOrchestrator │  ← every region in parallel, plus the global scope
//! └────────┬───────────────┘
//!          │
//! ┌────────▼──────────┐     ┌─────────────────┐
//! │ ServiceCollectors │ ──► │ PricingResolver │
//! └────────┬──────────┘     └────────┬────────┘
//!          │                         │
//! ┌────────▼─────────────────────────▼┐
//! │             CloudApi              │  ← HTTP gateway or static fixture
//! └───────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_inventory::{
//!     CloudProvider, CollectionOrchestrator, CollectorRegistry, FixtureDocument, StaticCloudApi,
//! };
//!
//! # async fn example() -> Result<(), domain_inventory::InventoryError> {
//! let api = Arc::new(StaticCloudApi::new(FixtureDocument::default()));
//! let orchestrator = CollectionOrchestrator::new(
//!     CollectorRegistry::with_defaults(),
//!     vec!["eu-central-1".to_string()],
//!     CloudProvider::Aws,
//! );
//! let report = orchestrator.collect_all(api).await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```

pub mod billing;
pub mod cloud_api;
pub mod collectors;
pub mod deploy;
pub mod error;
pub mod files;
pub mod fixture;
pub mod http_api;
pub mod models;
pub mod orchestrator;
pub mod pricing;
pub mod result_tree;
pub mod service;

pub use billing::{BillingCalculator, LiveRates};
pub use cloud_api::{
    ApiError, ApiResult, CloudApi, CloudApiFactory, Credentials, LaunchSpec, PriceFilter,
};
pub use collectors::{CollectContext, CollectorRegistry, ServiceCollector};
pub use deploy::{
    ApiProvisioner, DeployPipeline, DeployRequest, PollPolicy, ProvisionedInstance, Provisioner,
};
pub use error::{InventoryError, InventoryResult};
pub use files::FileStorage;
pub use fixture::{FixtureDocument, StaticCloudApi};
pub use http_api::{HttpApiConfig, HttpCloudApi, HttpCloudApiFactory};
pub use models::{
    Bucket, BucketObject, CloudProvider, Instance, InstanceState, Network, Resource, ResourceId,
    ResourceKind, Scope, Subnet,
};
pub use orchestrator::{CollectionObserver, CollectionOrchestrator, CollectionReport};
pub use pricing::PricingResolver;
pub use result_tree::{Field, ResultNode, ToResultNode};
pub use service::{CachedView, InventoryService, JobTimeouts};
