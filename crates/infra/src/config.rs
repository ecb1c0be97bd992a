//! Configuration loading and representation.
//!
//! Values come from environment variables prefixed `INVORIA_`, with `__`
//! separating nested keys:
//!
//! | variable | meaning |
//! |---|---|
//! | `INVORIA_BACKEND__URL` | base URL of the hosted data API (required) |
//! | `INVORIA_BACKEND__API_KEY` | project API key sent as `apikey` (required) |
//! | `INVORIA_BACKEND__ACCESS_TOKEN` | operator session token (optional) |
//! | `INVORIA_BACKEND__TIMEOUT_SECS` | per-request timeout, default 30 |
//! | `INVORIA_LOG_FORMAT` | `json` (default) or `pretty` |

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use invoria_observability::LogFormat;

pub const ENV_PREFIX: &str = "INVORIA";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "backend.url must be an http(s) URL, got '{}'",
                self.url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.api_key is empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("backend.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(vars);

        let cfg: AppConfig = config::Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;

        cfg.backend.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn loads_backend_settings_with_defaults() {
        let cfg = AppConfig::from_vars(vars(&[
            ("INVORIA_BACKEND__URL", "https://project.example.co/"),
            ("INVORIA_BACKEND__API_KEY", "anon-key"),
        ]))
        .unwrap();

        assert_eq!(cfg.backend.base_url(), "https://project.example.co");
        assert_eq!(cfg.backend.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.backend.access_token, None);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn overrides_timeout_and_log_format() {
        let cfg = AppConfig::from_vars(vars(&[
            ("INVORIA_BACKEND__URL", "http://localhost:54321"),
            ("INVORIA_BACKEND__API_KEY", "anon-key"),
            ("INVORIA_BACKEND__TIMEOUT_SECS", "5"),
            ("INVORIA_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(cfg.backend.timeout_secs, 5);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_non_http_url() {
        let err = AppConfig::from_vars(vars(&[
            ("INVORIA_BACKEND__URL", "ftp://nope"),
            ("INVORIA_BACKEND__API_KEY", "anon-key"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_url_is_a_load_error() {
        let err = AppConfig::from_vars(vars(&[("INVORIA_BACKEND__API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
