//! Broker configuration.

use serde::Deserialize;
use std::time::Duration;

/// Valkey/Redis broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Connection URL.
    pub url: String,
    /// Optional key/channel namespace prefix.
    pub namespace: Option<String>,
    /// Maximum pool connections.
    pub pool_size: usize,
    /// Timeout for remote RPC calls.
    #[serde(with = "serde_duration_secs")]
    pub rpc_timeout: Duration,
    /// TTL for presence announcements in seconds.
    pub presence_ttl_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_owned(),
            namespace: Some("meridian".to_owned()),
            pool_size: 10,
            rpc_timeout: Duration::from_secs(30),
            presence_ttl_secs: 30,
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
        let config = BrokerConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.namespace.as_deref(), Some("meridian"));
        assert_eq!(config.rpc_timeout, Duration::from_secs(30));
    }
}
