//! Configuration management for Marketguard.
//!
//! Settings come from an optional YAML file, overridden by environment
//! variables prefixed with `MARKETGUARD__` (for example
//! `MARKETGUARD__SERVER__GRPC_ADDR=0.0.0.0:9000`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{MarketguardError, Result};
use crate::ratelimit::PolicyTable;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "MARKETGUARD";

/// Main configuration for the Marketguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Seconds between sweeps of expired entries
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// YAML file with policy overrides, layered over the built-in presets
    #[serde(default)]
    pub policies_path: Option<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            policies_path: None,
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// The presets, overridden by `policies_path` when set.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        let mut table = PolicyTable::with_presets();
        if let Some(ref path) = self.policies_path {
            table.merge(PolicyTable::from_file(path)?);
        }
        Ok(table)
    }
}

impl GuardConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: GuardConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig =
            serde_yaml::from_str(yaml).map_err(|e| MarketguardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.limiter.sweep_interval_secs == 0 {
            return Err(MarketguardError::Config(
                "limiter.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
