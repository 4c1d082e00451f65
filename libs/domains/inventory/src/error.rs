use domain_jobs::JobError;
use thiserror::Error;

use crate::cloud_api::ApiError;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error)]
pub enum InventoryError {
    /// Account identity could not be established
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// One service enumeration failed within one scope
    #[error("Collector '{service}' failed in {scope}: {cause}")]
    Collector {
        service: String,
        scope: String,
        cause: String,
    },

    #[error("Cloud API error: {0}")]
    Api(#[from] ApiError),

    #[error("Failed to parse {0}")]
    Parse(String),

    #[error(transparent)]
    Jobs(#[from] JobError),

    #[error("Deploy failed: {0}")]
    Deploy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InventoryError {
    pub fn collector(service: &str, scope: &str, cause: impl std::fmt::Display) -> Self {
        Self::Collector {
            service: service.to_string(),
            scope: scope.to_string(),
            cause: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Parse(err.to_string())
    }
}
