//! Wiring of the cloud client, job store and inventory service

use domain_inventory::{
    CloudApi, CloudApiFactory, CollectionOrchestrator, CollectorRegistry, Credentials,
    HttpCloudApiFactory, InventoryService, StaticCloudApi,
};
use domain_jobs::{
    InMemoryJobStatusRepository, InMemoryResultCacheRepository, JobRunner, JobStatusStore,
    PgJobStatusRepository, PgResultCacheRepository, ResultCache, SystemClock,
};
use eyre::{eyre, Result, WrapErr};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;

pub struct App {
    pub service: InventoryService,
    pub factory: Arc<dyn CloudApiFactory>,
    pub credentials: Credentials,
    regions: Vec<String>,
    config: Config,
}

impl App {
    /// `regions` overrides the configured list when given
    pub async fn build(
        config: Config,
        fixture: Option<&Path>,
        regions: Option<Vec<String>>,
    ) -> Result<Self> {
        let factory = factory(&config, fixture).await?;
        let credentials = credentials(&config, fixture.is_some())?;
        let runner = runner(&config).await?;
        let regions = regions.unwrap_or_else(|| config.regions.clone());

        let service = InventoryService::new(
            runner,
            orchestrator(&config, regions.clone()),
            factory.clone(),
            Arc::new(SystemClock),
        )
        .with_timeouts(config.timeouts)
        .with_deploy_poll_interval(config.deploy_poll_interval);

        Ok(Self {
            service,
            factory,
            credentials,
            regions,
            config,
        })
    }

    /// A standalone orchestrator, for passes that bypass the job runner
    pub fn orchestrator(&self) -> CollectionOrchestrator {
        orchestrator(&self.config, self.regions.clone())
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn connect(&self) -> Result<Arc<dyn CloudApi>> {
        self.factory
            .connect(&self.credentials)
            .wrap_err("Failed to create cloud client")
    }
}

fn orchestrator(config: &Config, regions: Vec<String>) -> CollectionOrchestrator {
    CollectionOrchestrator::new(CollectorRegistry::with_defaults(), regions, config.provider)
}

async fn factory(config: &Config, fixture: Option<&Path>) -> Result<Arc<dyn CloudApiFactory>> {
    if let Some(path) = fixture {
        info!(path = %path.display(), "Serving the account from a fixture");
        let api = StaticCloudApi::from_path(path)
            .await
            .wrap_err_with(|| format!("Failed to load fixture {}", path.display()))?;
        return Ok(Arc::new(api));
    }

    let api = config
        .api
        .clone()
        .ok_or_else(|| eyre!("INVENTORY_API_URL is not set; pass --fixture for an offline run"))?;
    info!(base_url = %api.base_url, "Using the cloud gateway");
    Ok(Arc::new(HttpCloudApiFactory::new(api)))
}

fn credentials(config: &Config, offline: bool) -> Result<Credentials> {
    match (&config.credentials, offline) {
        (Some(credentials), _) => Ok(credentials.clone()),
        (None, true) => Ok(Credentials::new("fixture", "fixture")),
        (None, false) => Err(eyre!(
            "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set"
        )),
    }
}

async fn runner(config: &Config) -> Result<JobRunner> {
    let clock = Arc::new(SystemClock);

    let Some(url) = &config.database_url else {
        info!("DATABASE_URL not set; job status and results live in memory");
        return Ok(JobRunner::new(
            JobStatusStore::new(Arc::new(InMemoryJobStatusRepository::new()), clock.clone()),
            ResultCache::new(Arc::new(InMemoryResultCacheRepository::new()), clock),
        ));
    };

    info!("Connecting to database...");
    let mut options = ConnectOptions::new(url.as_str());
    options
        .max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .wrap_err("Database connection failed")?;
    Migrator::up(&db, None)
        .await
        .wrap_err("Failed to apply migrations")?;

    Ok(JobRunner::new(
        JobStatusStore::new(Arc::new(PgJobStatusRepository::new(db.clone())), clock.clone()),
        ResultCache::new(Arc::new(PgResultCacheRepository::new(db)), clock),
    ))
}
