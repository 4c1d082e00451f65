//! Configuration for the inventory collector

use core_config::{
    env_list, env_optional, env_or_default, env_parse, env_secs, ConfigError, Environment, FromEnv,
};
use domain_inventory::{CloudProvider, Credentials, HttpApiConfig, JobTimeouts};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_REGIONS: &[&str] = &["eu-central-1"];

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub provider: CloudProvider,
    pub regions: Vec<String>,
    /// Cloud gateway; unset means only `--fixture` runs are possible
    pub api: Option<HttpApiConfig>,
    pub timeouts: JobTimeouts,
    pub deploy_poll_interval: Duration,
    /// Postgres store for job status and cached results; in-memory when unset
    pub database_url: Option<String>,
    pub credentials: Option<Credentials>,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        let provider_name = env_or_default("INVENTORY_PROVIDER", "aws");
        let provider =
            CloudProvider::from_str(&provider_name).map_err(|e| ConfigError::ParseError {
                key: "INVENTORY_PROVIDER".to_string(),
                details: e.to_string(),
            })?;

        let api = match env_optional("INVENTORY_API_URL") {
            Some(base_url) => Some(HttpApiConfig {
                base_url,
                timeout: env_secs("INVENTORY_API_TIMEOUT_SECS", 30)?,
            }),
            None => None,
        };

        let refresh = env_secs("INVENTORY_REFRESH_TIMEOUT_SECS", 600)?;
        let timeouts = JobTimeouts {
            refresh,
            billing: env_secs("INVENTORY_BILLING_TIMEOUT_SECS", refresh.as_secs())?,
            deploy: env_secs("INVENTORY_DEPLOY_TIMEOUT_SECS", 1800)?,
        };

        Ok(Self {
            environment: Environment::from_env(),
            provider,
            regions: env_list("INVENTORY_REGIONS", DEFAULT_REGIONS),
            api,
            timeouts,
            deploy_poll_interval: Duration::from_secs(env_parse("INVENTORY_DEPLOY_POLL_SECS", 10)?),
            database_url: env_optional("DATABASE_URL"),
            credentials: credentials_from_env(),
        })
    }
}

/// `AWS_ACCESS_KEY_ID` + `AWS_SECRET_ACCESS_KEY`, with an optional `AWS_SESSION_TOKEN`
fn credentials_from_env() -> Option<Credentials> {
    let access_key_id = env_optional("AWS_ACCESS_KEY_ID")?;
    let secret_access_key = env_optional("AWS_SECRET_ACCESS_KEY")?;

    let mut credentials = Credentials::new(access_key_id, secret_access_key);
    credentials.session_token = env_optional("AWS_SESSION_TOKEN");
    Some(credentials)
}
