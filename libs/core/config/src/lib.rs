pub mod tracing;

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Load an environment variable, falling back to `default` when unset
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an environment variable or return an error
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Load an optional environment variable; empty values count as unset
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable into `T`, using `default` when unset
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Comma-separated list, trimmed, empty entries dropped
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env_optional(key) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Duration expressed in whole seconds
pub fn env_secs(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    env_parse::<u64>(key, default_secs).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_to_development() {
        temp_env::with_var_unset("APP_ENV", || {
            let env = Environment::from_env();
            assert_eq!(env, Environment::Development);
            assert!(env.is_development());
            assert!(!env.is_production());
        });
    }

    #[test]
    fn test_environment_production_case_insensitive() {
        temp_env::with_var("APP_ENV", Some("PRODUCTION"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("MISSING_REQUIRED", || {
            let err = env_required("MISSING_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("MISSING_REQUIRED"));
        });
    }

    #[test]
    fn test_env_optional_treats_blank_as_unset() {
        temp_env::with_var("BLANK_VAR", Some("   "), || {
            assert_eq!(env_optional("BLANK_VAR"), None);
        });
    }

    #[test]
    fn test_env_parse_uses_default_and_reports_errors() {
        temp_env::with_var_unset("TIMEOUT_SECS", || {
            assert_eq!(env_parse::<u64>("TIMEOUT_SECS", 600).unwrap(), 600);
        });

        temp_env::with_var("TIMEOUT_SECS", Some("ten"), || {
            let err = env_parse::<u64>("TIMEOUT_SECS", 600).unwrap_err();
            assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == "TIMEOUT_SECS"));
        });
    }

    #[test]
    fn test_env_list_splits_and_trims() {
        temp_env::with_var("REGIONS", Some("eu-central-1, us-east-1,,"), || {
            assert_eq!(env_list("REGIONS", &["x"]), vec!["eu-central-1", "us-east-1"]);
        });

        temp_env::with_var_unset("REGIONS", || {
            assert_eq!(env_list("REGIONS", &["eu-central-1"]), vec!["eu-central-1"]);
        });
    }

    #[test]
    fn test_env_secs() {
        temp_env::with_var("POLL_SECS", Some("10"), || {
            assert_eq!(env_secs("POLL_SECS", 1).unwrap(), Duration::from_secs(10));
        });
    }
}
