//! Configuration module for betforge.
//!
//! Structured configuration loading from environment variables, organized
//! by concern: prediction gateway, cache, discovery run and persistence.

use crate::application::cached_client::CacheConfig;
use crate::application::orchestrator::DiscoveryConfig;
use crate::domain::types::RiskLevel;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// In-process mock gateway and repositories, no live service needed
    Mock,
    /// Live prediction service over RPC/REST with SQLite persistence
    Live,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "live" => Ok(Mode::Live),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'live'", s),
        }
    }
}

/// Prediction service endpoints and deadlines
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Binary RPC address (primary transport), e.g. "127.0.0.1:9100"
    pub rpc_addr: String,
    /// REST base URL (health checks, administrative fallback)
    pub rest_base_url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub cache: CacheConfig,
    pub discovery: DiscoveryConfig,
    /// Minimum interval between scheduler-driven retraining triggers
    pub retrain_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode = env_or("MODE", "mock")
            .parse::<Mode>()
            .context("Failed to parse MODE")?;

        let gateway = GatewayConfig {
            rpc_addr: env_or("PREDICTION_RPC_ADDR", "127.0.0.1:9100"),
            rest_base_url: env_or("PREDICTION_REST_URL", "http://127.0.0.1:8200"),
            request_timeout: Duration::from_secs(parse_env("PREDICTION_TIMEOUT_SECS", 10)?),
        };

        let cache = CacheConfig {
            ttl: Duration::from_secs(parse_env("CACHE_TTL_SECS", 300)?),
            max_entries: parse_env("CACHE_MAX_ENTRIES", 1000)?,
        };

        let risk_level = env_or("DISCOVERY_RISK_LEVEL", "moderate")
            .parse::<RiskLevel>()
            .context("Failed to parse DISCOVERY_RISK_LEVEL")?;

        let discovery = DiscoveryConfig {
            generate_count: parse_env("DISCOVERY_GENERATE_COUNT", 10)?,
            risk_level,
            target_return: parse_env("DISCOVERY_TARGET_RETURN", 0.15)?,
            min_composite_score: parse_env("DISCOVERY_MIN_SCORE", 0.65)?,
            deactivate_threshold: parse_env("DISCOVERY_DEACTIVATE_THRESHOLD", 0.50)?,
            top_n: parse_env("DISCOVERY_TOP_N", 10)?,
            feedback_enabled: parse_env("FEEDBACK_ENABLED", true)?,
            feedback_batch_size: parse_env("FEEDBACK_BATCH_SIZE", 100)?,
            retrain_enabled: parse_env("RETRAIN_ENABLED", false)?,
        };

        let config = Self {
            mode,
            database_url: env_or("DATABASE_URL", "sqlite://data/betforge.db"),
            gateway,
            cache,
            discovery,
            retrain_interval: Duration::from_secs(parse_env("RETRAIN_INTERVAL_SECS", 86400)?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let d = &self.discovery;
        if !(0.0..=1.0).contains(&d.min_composite_score) {
            anyhow::bail!("DISCOVERY_MIN_SCORE must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&d.deactivate_threshold) {
            anyhow::bail!("DISCOVERY_DEACTIVATE_THRESHOLD must be in [0, 1]");
        }
        if d.deactivate_threshold > d.min_composite_score {
            anyhow::bail!(
                "DISCOVERY_DEACTIVATE_THRESHOLD ({}) must not exceed DISCOVERY_MIN_SCORE ({})",
                d.deactivate_threshold,
                d.min_composite_score
            );
        }
        if d.top_n == 0 {
            anyhow::bail!("DISCOVERY_TOP_N must be at least 1");
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("CACHE_MAX_ENTRIES must be at least 1");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Failed to parse {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("mock".parse::<Mode>().unwrap(), Mode::Mock);
        assert_eq!("LIVE".parse::<Mode>().unwrap(), Mode::Live);
        assert!("paper".parse::<Mode>().is_err());
    }

    #[test]
    fn test_threshold_ordering_rejected() {
        let mut config = Config {
            mode: Mode::Mock,
            database_url: "sqlite://test.db".to_string(),
            gateway: GatewayConfig {
                rpc_addr: "127.0.0.1:9100".to_string(),
                rest_base_url: "http://127.0.0.1:8200".to_string(),
                request_timeout: Duration::from_secs(10),
            },
            cache: CacheConfig::default(),
            discovery: DiscoveryConfig::default(),
            retrain_interval: Duration::from_secs(86400),
        };
        assert!(config.validate().is_ok());

        config.discovery.deactivate_threshold = 0.90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_top_n_rejected() {
        let mut config = Config {
            mode: Mode::Mock,
            database_url: "sqlite://test.db".to_string(),
            gateway: GatewayConfig {
                rpc_addr: "127.0.0.1:9100".to_string(),
                rest_base_url: "http://127.0.0.1:8200".to_string(),
                request_timeout: Duration::from_secs(10),
            },
            cache: CacheConfig::default(),
            discovery: DiscoveryConfig::default(),
            retrain_interval: Duration::from_secs(86400),
        };
        config.discovery.top_n = 0;
        assert!(config.validate().is_err());
    }
}
