//! Per-service lifecycle phase and diagnosis tracking.

use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::warn;

use meridian_core::{Diagnosis, Verdict};

/// The host-side lifecycle phase of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    /// Registered; startup hook not yet complete.
    Starting,
    /// Startup complete, accepting calls.
    Ready,
    /// Shutdown requested; in-flight calls draining, new calls rejected.
    Draining,
    /// Drained and stopped.
    Stopped,
    /// Startup failed; the service never accepts calls.
    Failed,
}

impl ServicePhase {
    /// Returns true if dispatch may route new calls to the service.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Health snapshot for a single service.
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    /// Current lifecycle phase.
    pub phase: ServicePhase,
    /// Most recent self-check result.
    pub last_diagnosis: Option<Diagnosis>,
    /// When the last self-check ran.
    pub last_checked: Option<Instant>,
    /// Consecutive fatal verdicts.
    pub consecutive_fatal: u32,
    /// When the service was registered with the tracker.
    pub registered_at: Instant,
}

impl ServiceHealth {
    fn new() -> Self {
        Self {
            phase: ServicePhase::Starting,
            last_diagnosis: None,
            last_checked: None,
            consecutive_fatal: 0,
            registered_at: Instant::now(),
        }
    }

    /// Returns true if this service does not block process readiness.
    ///
    /// A service is ready once past `Starting`, still running, and its last
    /// self-check (if any) was non-fatal.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let phase_ok = matches!(self.phase, ServicePhase::Ready | ServicePhase::Draining);
        let verdict_ok = self
            .last_diagnosis
            .as_ref()
            .map_or(true, |d| !d.verdict.is_fatal());

        phase_ok && verdict_ok
    }
}

struct HealthEntry {
    health: ServiceHealth,
    phase_tx: watch::Sender<ServicePhase>,
}

/// Tracks the phase and latest diagnosis of every hosted service.
#[derive(Default)]
pub struct HealthTracker {
    entries: DashMap<String, HealthEntry>,
}

impl HealthTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Starts tracking a service in the `Starting` phase.
    ///
    /// Re-registering a name resets its entry.
    pub fn register(&self, name: &str) {
        let (phase_tx, _) = watch::channel(ServicePhase::Starting);
        self.entries.insert(
            name.to_owned(),
            HealthEntry {
                health: ServiceHealth::new(),
                phase_tx,
            },
        );
    }

    /// Records a phase transition and notifies phase watchers.
    pub fn set_phase(&self, name: &str, phase: ServicePhase) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            entry.health.phase = phase;
            entry.phase_tx.send_replace(phase);
        }
    }

    /// Records the outcome of a self-check.
    pub fn record_diagnosis(&self, name: &str, diagnosis: Diagnosis) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            if diagnosis.verdict == Verdict::Fatal {
                entry.health.consecutive_fatal += 1;
                warn!(
                    service = %name,
                    detail = diagnosis.detail.as_deref().unwrap_or(""),
                    consecutive = entry.health.consecutive_fatal,
                    "service reported fatal diagnosis"
                );
            } else {
                entry.health.consecutive_fatal = 0;
            }

            entry.health.last_diagnosis = Some(diagnosis);
            entry.health.last_checked = Some(Instant::now());
        }
    }

    /// Gets the health snapshot for a service.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ServiceHealth> {
        self.entries.get(name).map(|entry| entry.health.clone())
    }

    /// Returns a watch over the service's phase, for callers that need to
    /// wait out `Starting`.
    #[must_use]
    pub fn phase_watch(&self, name: &str) -> Option<watch::Receiver<ServicePhase>> {
        self.entries
            .get(name)
            .map(|entry| entry.phase_tx.subscribe())
    }

    /// Stops tracking a service.
    pub fn remove(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Snapshots all tracked services, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<(String, ServiceHealth)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.health.clone()))
            .collect()
    }

    /// Returns true if every tracked service is ready.
    ///
    /// An empty tracker is ready: a host with no services has nothing
    /// unhealthy to report.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.entries.iter().all(|entry| entry.health.is_ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_blocks_readiness() {
        let tracker = HealthTracker::new();
        tracker.register("billing");

        assert!(!tracker.all_ready());

        tracker.set_phase("billing", ServicePhase::Ready);
        assert!(tracker.all_ready());
    }

    #[test]
    fn fatal_diagnosis_blocks_readiness() {
        let tracker = HealthTracker::new();
        tracker.register("billing");
        tracker.set_phase("billing", ServicePhase::Ready);

        tracker.record_diagnosis("billing", Diagnosis::fatal("lost backing store"));
        assert!(!tracker.all_ready());

        let health = tracker.get("billing").unwrap();
        assert_eq!(health.consecutive_fatal, 1);

        // Recovery resets the counter and readiness.
        tracker.record_diagnosis("billing", Diagnosis::ok());
        assert!(tracker.all_ready());
        assert_eq!(tracker.get("billing").unwrap().consecutive_fatal, 0);
    }

    #[test]
    fn degraded_does_not_block_readiness() {
        let tracker = HealthTracker::new();
        tracker.register("billing");
        tracker.set_phase("billing", ServicePhase::Ready);

        tracker.record_diagnosis("billing", Diagnosis::degraded("queue lag"));
        assert!(tracker.all_ready());
    }

    #[tokio::test]
    async fn phase_watch_observes_transitions() {
        let tracker = HealthTracker::new();
        tracker.register("billing");

        let mut watch = tracker.phase_watch("billing").unwrap();
        assert_eq!(*watch.borrow(), ServicePhase::Starting);

        tracker.set_phase("billing", ServicePhase::Ready);

        let phase = *watch
            .wait_for(|p| *p != ServicePhase::Starting)
            .await
            .unwrap();
        assert_eq!(phase, ServicePhase::Ready);
    }

    #[test]
    fn empty_tracker_is_ready() {
        assert!(HealthTracker::new().all_ready());
    }
}
