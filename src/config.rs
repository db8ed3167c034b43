// src/config.rs

//! # Service Configuration
//!
//! Settings are loaded from a single JSON file; every section is optional and
//! falls back to defaults. Secrets (API keys, database and RPC URLs) come from
//! the environment so they never live in the config file.

use crate::types::Chain;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

//================================================================================================//
//                                       Top-Level Config                                         //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_season")]
    pub season: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Age below which a cached score is served without re-scanning.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Forces a re-scan on every request.
    #[serde(default)]
    pub development: bool,
    #[serde(default = "default_secondary_chain_id")]
    pub secondary_chain_id: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub rate_limiter_settings: RateLimiterSettings,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub etherscan_api_key: Option<String>,
    pub polygonscan_api_key: Option<String>,
    pub ethplorer_api_key: Option<String>,
    pub poap_api_key: Option<String>,
    pub unstoppable_api_key: Option<String>,
    pub eth_rpc_url: Option<String>,
    pub database_url: Option<String>,
}

impl Secrets {
    fn from_env() -> Self {
        Self {
            etherscan_api_key: env_var("ETHERSCAN_API_KEY"),
            polygonscan_api_key: env_var("POLYGONSCAN_API_KEY"),
            ethplorer_api_key: env_var("ETHPLORER_API_KEY"),
            poap_api_key: env_var("POAP_API_KEY"),
            unstoppable_api_key: env_var("UNSTOPPABLE_API_KEY"),
            eth_rpc_url: env_var("ETH_RPC_URL"),
            database_url: env_var("DATABASE_URL"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub etherscan: String,
    pub polygonscan: String,
    pub ethplorer: String,
    pub poap: String,
    pub unstoppable: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            etherscan: "https://api.etherscan.io/api".to_string(),
            polygonscan: "https://api.polygonscan.com/api".to_string(),
            ethplorer: "https://api.ethplorer.io".to_string(),
            poap: "https://api.poap.tech".to_string(),
            unstoppable: "https://resolve.unstoppabledomains.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Requests per second allowed per upstream service.
    pub default_rps_limit: u32,
    pub burst_size: u32,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub limiter_timeout_secs: u64,
    /// Per-service overrides of `default_rps_limit`, keyed by service name.
    pub service_rps_limits: std::collections::HashMap<String, u32>,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            default_rps_limit: 5,
            burst_size: 5,
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
            limiter_timeout_secs: 30,
            service_rps_limits: Default::default(),
        }
    }
}

impl RateLimiterSettings {
    pub fn rps_for(&self, service: &str) -> u32 {
        self.service_rps_limits
            .get(service)
            .copied()
            .unwrap_or(self.default_rps_limit)
    }
}

fn default_season() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("config/achievements_season2.json")
}

fn default_secondary_chain_id() -> u64 {
    Chain::Polygon.chain_id()
}

fn default_http_timeout_secs() -> u64 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            season: default_season(),
            log_level: default_log_level(),
            cache_ttl_secs: default_cache_ttl_secs(),
            catalog_path: default_catalog_path(),
            development: false,
            secondary_chain_id: default_secondary_chain_id(),
            http_timeout_secs: default_http_timeout_secs(),
            endpoints: EndpointConfig::default(),
            rate_limiter_settings: RateLimiterSettings::default(),
            secrets: Secrets::default(),
        }
    }
}

impl Config {
    /// Loads a config file and applies environment overrides.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut cfg: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from JSON: {}", path.as_ref().display()))?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::from_file`], but falls back to defaults when the file is absent.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path).await;
        }
        warn!("Config file {} not found, using defaults", path.as_ref().display());
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        self.secrets = Secrets::from_env();
        if env_var("DEVELOPMENT").is_some() {
            self.development = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(eyre::eyre!("cache_ttl_secs must be greater than zero"));
        }
        if self.rate_limiter_settings.default_rps_limit == 0
            || self.rate_limiter_settings.service_rps_limits.values().any(|v| *v == 0)
        {
            return Err(eyre::eyre!("rate limits must be greater than zero"));
        }
        if self.catalog_path.as_os_str().is_empty() {
            return Err(eyre::eyre!("catalog_path must not be empty"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "cache_ttl_secs": 60, "rate_limiter_settings": {{ "service_rps_limits": {{ "poap": 2 }} }} }}"#
        )
        .unwrap();

        let cfg = Config::from_file(file.path()).await.unwrap();
        assert_eq!(cfg.season, 2);
        assert_eq!(cfg.cache_ttl_secs, 60);
        assert_eq!(cfg.secondary_chain_id, 137);
        assert_eq!(cfg.rate_limiter_settings.rps_for("poap"), 2);
        assert_eq!(cfg.rate_limiter_settings.rps_for("etherscan"), 5);
        assert_eq!(cfg.endpoints.etherscan, "https://api.etherscan.io/api");
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cache_ttl_secs": 0 }}"#).unwrap();
        assert!(Config::from_file(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let cfg = Config::load_or_default("/nonexistent/score.json").await.unwrap();
        assert_eq!(cfg.cache_ttl(), chrono::Duration::hours(24));
    }
}
