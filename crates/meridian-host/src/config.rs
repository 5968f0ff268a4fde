//! Host configuration.
//!
//! Loaded from `meridian.toml` plus `MERIDIAN_`-prefixed environment
//! variables; every setting has a default so a bare host runs without any
//! configuration at all.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use thiserror::Error;

use meridian_broker::BrokerConfig;

use crate::registry::DuplicatePolicy;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("configuration error: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Health/readiness API configuration.
    pub health: HealthApiSettings,
    /// Lifecycle timing configuration.
    pub lifecycle: LifecycleSettings,
    /// Registry behaviour.
    pub registry: RegistrySettings,
    /// Broker configuration.
    pub broker: BrokerSettings,
}

impl HostConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in the following order (later sources override
    /// earlier):
    /// 1. Default values
    /// 2. `meridian.toml` in the current directory (if present)
    /// 3. Specified config file path (if provided)
    /// 4. Environment variables with `MERIDIAN_` prefix
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Toml::file("meridian.toml"));

        if let Some(p) = path {
            figment = figment.merge(Toml::file(p));
        }

        figment
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }
}

/// Health/readiness API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthApiSettings {
    /// Whether to serve the health API at all.
    pub enabled: bool,
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for HealthApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8081),
        }
    }
}

/// Lifecycle timing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Grace period for draining in-flight RPCs during shutdown.
    #[serde(with = "serde_duration_secs")]
    pub drain_grace: Duration,
    /// Interval between periodic service self-checks.
    #[serde(with = "serde_duration_secs")]
    pub diagnostics_interval: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            drain_grace: Duration::from_secs(30),
            diagnostics_interval: Duration::from_secs(10),
        }
    }
}

/// Registry behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// What happens when a name is registered twice.
    pub duplicate_policy: DuplicatePolicy,
}

/// Broker configuration with an enable flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Whether services subscribe to the broker for cross-process RPC.
    ///
    /// In-process dispatch works either way; disabled is the single-process
    /// default.
    pub enabled: bool,

    /// Connection settings.
    #[serde(flatten)]
    pub connection: BrokerConfig,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            connection: BrokerConfig::default(),
        }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = HostConfig::default();
        assert!(config.health.enabled);
        assert_eq!(config.health.listen_addr.port(), 8081);
        assert_eq!(config.lifecycle.drain_grace, Duration::from_secs(30));
        assert_eq!(
            config.registry.duplicate_policy,
            DuplicatePolicy::Reject
        );
        assert!(!config.broker.enabled);
    }

    #[test]
    fn duplicate_policy_parses_lowercase() {
        let settings: RegistrySettings =
            serde_json::from_str(r#"{ "duplicate_policy": "replace" }"#).unwrap();
        assert_eq!(settings.duplicate_policy, DuplicatePolicy::Replace);
    }
}
