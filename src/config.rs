//! Configuration management for Ratewell.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RatewellError, Result};

/// Prefix for environment overrides, e.g. `RATEWELL__SERVER__BIND_ADDR`.
const ENV_PREFIX: &str = "RATEWELL";

/// Main configuration for the Ratewell service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatewellConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Idle bucket eviction configuration
    #[serde(default)]
    pub eviction: EvictionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Calls per minute allowed for each client address. Zero disables limiting.
    #[serde(default = "default_limit_per_minute")]
    pub limit_per_minute: i64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit_per_minute: default_limit_per_minute(),
        }
    }
}

fn default_limit_per_minute() -> i64 {
    120
}

/// Idle bucket eviction configuration.
///
/// Eviction is off unless `sweep_interval_secs` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// How long a drained bucket must sit untouched before it is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often to sweep; 0 disables the sweeper
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: 0,
        }
    }
}

fn default_idle_timeout() -> u64 {
    300
}

impl EvictionConfig {
    /// Whether a background sweeper should run.
    pub fn enabled(&self) -> bool {
        self.sweep_interval_secs > 0
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl RatewellConfig {
    /// Load configuration from an optional YAML file layered under
    /// `RATEWELL__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: RatewellConfig = builder
            .build()
            .map_err(|e| RatewellError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| RatewellError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RatewellConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RatewellError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a listen address given as `host:port`, such as the `BIND_ADDR`
    /// environment variable or the `--bind` flag.
    pub fn with_bind_addr(mut self, addr: &str) -> Result<Self> {
        self.server.bind_addr = addr
            .parse()
            .map_err(|e| RatewellError::Config(format!("Invalid bind address {:?}: {}", addr, e)))?;
        Ok(self)
    }

    /// Check values serde cannot rule out on its own.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.limit_per_minute < 0 {
            return Err(RatewellError::Config(format!(
                "rate_limiting.limit_per_minute must not be negative, got {}",
                self.rate_limiting.limit_per_minute
            )));
        }
        if self.eviction.enabled() && self.eviction.idle_timeout_secs == 0 {
            return Err(RatewellError::Config(
                "eviction.idle_timeout_secs must be positive when the sweeper is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
