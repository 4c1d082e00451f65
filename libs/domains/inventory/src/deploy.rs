//! Provisioning of a new instance, tracked as a three phase checklist.
//!
//! 1. `generation`: the provisioner creates the instance
//! 2. `data_retrieval`: the instance is visible and has a public address
//! 3. `initialization`: the instance is running and passes both status checks

use async_trait::async_trait;
use domain_jobs::{DeployChecklist, DeployPhase, JobDetails, JobHandle, PhaseState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cloud_api::{CloudApi, LaunchSpec};
use crate::error::{InventoryError, InventoryResult};

/// Port the deployed service listens on
pub const SERVICE_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub region: String,
    pub resource_name: String,
    pub instance_type: String,
    pub repository_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedInstance {
    pub instance_id: String,
    #[serde(default)]
    pub public_address: Option<String>,
}

/// Creates the instance; how (templates, IaC tooling) is up to the implementation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, request: &DeployRequest) -> InventoryResult<ProvisionedInstance>;
}

/// Launches the instance through the account's own `CloudApi`.
///
/// The instance boots a script that clones the repository and starts the
/// service on [`SERVICE_PORT`].
pub struct ApiProvisioner {
    api: Arc<dyn CloudApi>,
    image_id: Option<String>,
}

impl ApiProvisioner {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self {
            api,
            image_id: None,
        }
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    fn launch_spec(&self, request: &DeployRequest) -> LaunchSpec {
        LaunchSpec {
            name: request.resource_name.clone(),
            instance_type: request.instance_type.clone(),
            image_id: self.image_id.clone(),
            user_data: user_data(&request.repository_url),
        }
    }
}

#[async_trait]
impl Provisioner for ApiProvisioner {
    async fn provision(&self, request: &DeployRequest) -> InventoryResult<ProvisionedInstance> {
        let launched = self
            .api
            .run_instance(&request.region, &self.launch_spec(request))
            .await?;
        let instance_id = launched
            .instance_id
            .ok_or_else(|| InventoryError::Deploy("launch returned no instance id".into()))?;

        Ok(ProvisionedInstance {
            instance_id,
            public_address: launched.public_ip_address,
        })
    }
}

fn user_data(repository_url: &str) -> String {
    format!(
        "#!/bin/bash\n\
         set -e\n\
         git clone {repository_url} /srv/app\n\
         cd /srv/app\n\
         python3 -m venv /srv/env\n\
         /srv/env/bin/pip install -r requirements.txt\n\
         /srv/env/bin/python manage.py migrate\n\
         /srv/env/bin/python manage.py runserver 0.0.0.0:{SERVICE_PORT}\n"
    )
}

pub fn service_url(address: &str) -> String {
    format!("http://{address}:{SERVICE_PORT}")
}

/// Polling settings for the gated phases
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Enough attempts to cover `timeout` at `interval`
    pub fn covering(timeout: Duration, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let attempts = (timeout.as_millis() / interval.as_millis()).max(1);
        Self {
            interval,
            max_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        }
    }
}

enum Poll<T> {
    Ready(T),
    Waiting,
    Gone,
}

pub struct DeployPipeline {
    api: Arc<dyn CloudApi>,
    provisioner: Arc<dyn Provisioner>,
    policy: PollPolicy,
}

impl DeployPipeline {
    pub fn new(
        api: Arc<dyn CloudApi>,
        provisioner: Arc<dyn Provisioner>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            api,
            provisioner,
            policy,
        }
    }

    /// Run every phase, reporting the checklist through `handle`.
    ///
    /// Returns the final checklist; a failed phase is marked before the error
    /// is returned.
    pub async fn run(
        &self,
        request: &DeployRequest,
        handle: &JobHandle,
    ) -> InventoryResult<DeployChecklist> {
        let provisioned = match self.provisioner.provision(request).await {
            Ok(provisioned) => provisioned,
            Err(e) => return Err(fail_phase(handle, DeployPhase::Generation, e).await),
        };
        let instance_id = provisioned.instance_id.clone();
        tracing::info!(instance_id = %instance_id, "Instance provisioned");
        update(handle, |c| {
            c.mark(DeployPhase::Generation, PhaseState::Done);
            c.instance_id = Some(instance_id.clone());
        })
        .await;

        let address = match self.retrieve_address(request, &provisioned).await {
            Ok(address) => address,
            Err(e) => return Err(fail_phase(handle, DeployPhase::DataRetrieval, e).await),
        };
        update(handle, |c| {
            c.mark(DeployPhase::DataRetrieval, PhaseState::Done);
            c.public_address = Some(address.clone());
        })
        .await;

        if let Err(e) = self.wait_initialized(request, &instance_id).await {
            return Err(fail_phase(handle, DeployPhase::Initialization, e).await);
        }
        update(handle, |c| {
            c.mark(DeployPhase::Initialization, PhaseState::Done);
            c.url = Some(service_url(&address));
        })
        .await;

        match handle.details().await {
            JobDetails::Deploy(checklist) => Ok(checklist),
            other => Err(InventoryError::Internal(format!(
                "deploy job carries {} details",
                other.kind()
            ))),
        }
    }

    async fn retrieve_address(
        &self,
        request: &DeployRequest,
        provisioned: &ProvisionedInstance,
    ) -> InventoryResult<String> {
        if let Some(address) = &provisioned.public_address {
            return Ok(address.clone());
        }

        let api = &self.api;
        let region = request.region.as_str();
        let ids = &[provisioned.instance_id.clone()];
        self.poll("data_retrieval", || async move {
            let instances = api.describe_instances(region, ids).await?;
            Ok(match instances.into_iter().next() {
                None => Poll::Gone,
                Some(instance) => match instance.public_ip_address {
                    Some(address) => Poll::Ready(address),
                    None => Poll::Waiting,
                },
            })
        })
        .await
    }

    async fn wait_initialized(
        &self,
        request: &DeployRequest,
        instance_id: &str,
    ) -> InventoryResult<()> {
        let api = &self.api;
        let region = request.region.as_str();
        let ids = &[instance_id.to_string()];
        self.poll("initialization", || async move {
            let Some(status) = api.describe_instance_status(region, instance_id).await? else {
                // No status while still pending; gone only once the instance itself is
                let instances = api.describe_instances(region, ids).await?;
                return Ok(if instances.is_empty() {
                    Poll::Gone
                } else {
                    Poll::Waiting
                });
            };
            Ok(if status.is_initialized() {
                Poll::Ready(())
            } else {
                Poll::Waiting
            })
        })
        .await
    }

    async fn poll<T, F, Fut>(&self, phase: &str, mut check: F) -> InventoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = InventoryResult<Poll<T>>>,
    {
        for attempt in 1..=self.policy.max_attempts {
            match check().await? {
                Poll::Ready(value) => return Ok(value),
                Poll::Gone => {
                    return Err(InventoryError::Deploy(format!(
                        "instance disappeared during {phase}"
                    )));
                }
                Poll::Waiting => {
                    tracing::debug!(phase, attempt, "Instance not ready yet");
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.interval).await;
                    }
                }
            }
        }

        Err(InventoryError::Deploy(format!(
            "{phase} not reached after {} checks",
            self.policy.max_attempts
        )))
    }
}

async fn update<F>(handle: &JobHandle, edit: F)
where
    F: FnOnce(&mut DeployChecklist),
{
    let result = handle
        .modify(|details| {
            if let JobDetails::Deploy(checklist) = details {
                edit(checklist);
            }
        })
        .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to report deploy progress");
    }
}

async fn fail_phase(
    handle: &JobHandle,
    phase: DeployPhase,
    error: InventoryError,
) -> InventoryError {
    tracing::error!(phase = %phase, error = %error, "Deploy phase failed");
    update(handle, |c| c.mark(phase, PhaseState::Failed)).await;
    error
}
