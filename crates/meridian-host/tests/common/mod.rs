//! Common test utilities for host integration tests.

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use meridian_host::{DuplicatePolicy, Host, HostConfig, ServicePhase};

/// A host wired for tests: no health listener, no broker, fast diagnostics.
pub struct TestHost {
    pub host: Arc<Host>,
}

impl TestHost {
    /// Creates a test host with the default (reject) duplicate policy.
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::Reject)
    }

    /// Creates a test host with the given duplicate policy.
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        let mut config = HostConfig::default();
        config.health.enabled = false;
        config.broker.enabled = false;
        config.registry.duplicate_policy = policy;
        config.lifecycle.diagnostics_interval = Duration::from_millis(50);
        config.lifecycle.drain_grace = Duration::from_secs(2);

        Self {
            host: Arc::new(Host::new(config)),
        }
    }

    /// Waits until the named service reaches the given phase.
    ///
    /// # Panics
    ///
    /// Panics if the phase is not reached within two seconds.
    pub async fn wait_for_phase(&self, name: &str, phase: ServicePhase) {
        let mut watch = self
            .host
            .health()
            .phase_watch(name)
            .unwrap_or_else(|| panic!("service {name} is not tracked"));

        let result =
            tokio::time::timeout(Duration::from_secs(2), watch.wait_for(|p| *p == phase)).await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => panic!("phase watch for {name} closed"),
            Err(_) => panic!("service {name} never reached {phase}"),
        }
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
