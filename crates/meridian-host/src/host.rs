//! The host: composes the registry, shutdown coordinator, broker handle and
//! per-service runner tasks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::signal;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use meridian_broker::{Broker, BrokerError};
use meridian_core::{Args, RpcError, Service, ServiceError};

use crate::api::{self, ApiState};
use crate::config::HostConfig;
use crate::health::{HealthTracker, ServicePhase};
use crate::registry::{Provenance, RegistryError, ServiceRegistry};
use crate::runner::ServiceRunner;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Host-level errors.
#[derive(Error, Debug)]
pub enum HostError {
    /// Registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The broker could not be reached.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A service factory failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// I/O error (e.g. binding the health API listener).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the services of one process and coordinates their lifecycle.
///
/// The host registers services by name, attaches each to the event loop as a
/// runner task, shares one lazily-established broker handle among them, and
/// guarantees an idempotent, race-free shutdown sequence driven by
/// terminating signals or an explicit [`Host::shutdown`] call.
pub struct Host {
    config: HostConfig,
    registry: Arc<ServiceRegistry>,
    health: Arc<HealthTracker>,
    shutdown: ShutdownCoordinator,
    broker: OnceCell<Arc<Broker>>,
    tasks: Mutex<JoinSet<(String, Result<(), ServiceError>)>>,
}

impl Host {
    /// Creates a host.
    ///
    /// The shutdown signal is initialised here, before anything can observe
    /// it, so observing-before-creation is impossible through the host.
    #[must_use]
    pub fn new(config: HostConfig) -> Self {
        let registry = Arc::new(ServiceRegistry::new(config.registry.duplicate_policy));
        let shutdown = ShutdownCoordinator::new();
        let _ = shutdown.signal();

        Self {
            config,
            registry,
            health: Arc::new(HealthTracker::new()),
            shutdown,
            broker: OnceCell::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// The host's registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// The host's health tracker.
    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Looks up a live service by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the name was never registered
    /// or its owning task has completed.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Service>, RegistryError> {
        self.registry.lookup(name)
    }

    /// Returns an observable view of the shutdown signal.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Requests graceful shutdown.
    ///
    /// Idempotent; returns a handle to the resolved signal.
    pub fn shutdown(&self) -> ShutdownSignal {
        self.shutdown.resolve()
    }

    /// The shared broker handle, established on first access.
    ///
    /// Subsequent calls return the same handle; its lifetime is tied to the
    /// host and it is never reconstructed.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if the first connection attempt fails; the
    /// next access retries.
    pub async fn broker(&self) -> Result<Arc<Broker>, BrokerError> {
        self.broker
            .get_or_try_init(|| async {
                Broker::connect(&self.config.broker.connection)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Adds a pre-built service.
    ///
    /// Synchronously registers the name and attaches the service's runner
    /// task before returning; the startup hook then runs asynchronously but
    /// always before any RPC is dispatched to the service.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Registry`] on a duplicate name under the reject
    /// policy.
    pub async fn add_service(&self, service: Arc<dyn Service>) -> Result<(), HostError> {
        self.attach(service, Provenance::Supplied).await
    }

    /// Constructs and adds a service, injecting the shared broker handle.
    ///
    /// The broker is `None` when disabled in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Service`] if the factory fails, or
    /// [`HostError::Registry`] on a duplicate name.
    pub async fn add_service_with<F, Fut>(&self, factory: F) -> Result<(), HostError>
    where
        F: FnOnce(Option<Arc<Broker>>) -> Fut,
        Fut: std::future::Future<Output = Result<Arc<dyn Service>, ServiceError>>,
    {
        let broker = self.broker_if_enabled().await;
        let service = factory(broker).await?;
        self.attach(service, Provenance::Constructed).await
    }

    /// Invokes a method on a hosted service, in-process.
    ///
    /// Waits out the service's `Starting` phase so dispatch never races the
    /// startup hook.
    ///
    /// # Errors
    ///
    /// Returns the service's typed [`RpcError`]; an unregistered or
    /// no-longer-live name surfaces as [`RpcError::ServiceUnavailable`]
    /// (use [`Host::lookup`] to distinguish).
    pub async fn call(&self, service: &str, method: &str, args: Args) -> Result<Value, RpcError> {
        let Ok(instance) = self.registry.lookup(service) else {
            return Err(RpcError::ServiceUnavailable);
        };

        let Some(mut phases) = self.health.phase_watch(service) else {
            return Err(RpcError::ServiceUnavailable);
        };

        let phase = match phases.wait_for(|p| *p != ServicePhase::Starting).await {
            Ok(phase) => *phase,
            Err(_) => return Err(RpcError::ServiceUnavailable),
        };

        if !phase.accepts_calls() {
            return Err(RpcError::ServiceUnavailable);
        }

        instance.methods().dispatch(method, args).await
    }

    /// Runs the host until shutdown.
    ///
    /// Serves the health API, installs handlers for interrupt and terminate
    /// signals (both resolve the same shutdown signal), blocks until the
    /// signal resolves, then drains every service runner.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Io`] if the health API listener cannot bind.
    pub async fn run(&self) -> Result<(), HostError> {
        let signal = self.shutdown.signal();

        let api_task = if self.config.health.enabled {
            Some(self.serve_api(&signal).await?)
        } else {
            None
        };

        tokio::select! {
            () = signal.resolved() => {
                info!("shutdown requested");
            }
            name = terminating_signal() => {
                info!(signal = name, "terminating signal received, initiating shutdown");
                self.shutdown.resolve();
            }
        }

        self.drain().await;

        if let Some(task) = api_task {
            let _ = task.await;
        }

        info!("host shutdown complete");
        Ok(())
    }

    async fn attach(
        &self,
        service: Arc<dyn Service>,
        provenance: Provenance,
    ) -> Result<(), HostError> {
        self.registry.register(&service, provenance)?;
        self.health.register(service.name());

        let runner = ServiceRunner {
            service: Arc::clone(&service),
            health: Arc::clone(&self.health),
            shutdown: self.shutdown.signal(),
            broker: self.broker_if_enabled().await,
            diagnostics_interval: self.config.lifecycle.diagnostics_interval,
            drain_grace: self.config.lifecycle.drain_grace,
        };

        let name = service.name().to_owned();
        drop(service);

        let mut tasks = self.tasks.lock().await;
        tasks.spawn(async move {
            let result = runner.run().await;
            (name, result)
        });

        Ok(())
    }

    /// The broker handle when enabled, with connection failure downgraded to
    /// a warning: the service still serves in-process calls.
    async fn broker_if_enabled(&self) -> Option<Arc<Broker>> {
        if !self.config.broker.enabled {
            return None;
        }

        match self.broker().await {
            Ok(broker) => Some(broker),
            Err(e) => {
                error!(error = %e, "broker unavailable, continuing without cross-process rpc");
                None
            }
        }
    }

    async fn serve_api(
        &self,
        signal: &ShutdownSignal,
    ) -> Result<tokio::task::JoinHandle<()>, HostError> {
        let state = Arc::new(ApiState {
            registry: Arc::clone(&self.registry),
            health: Arc::clone(&self.health),
        });

        let app = api::router(state);
        let listener = tokio::net::TcpListener::bind(self.config.health.listen_addr).await?;
        info!(addr = %self.config.health.listen_addr, "health API listening");

        let shutdown = {
            let signal = signal.clone();
            async move { signal.resolved().await }
        };

        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "health API server failed");
            }
        }))
    }

    /// Waits for every service runner to complete its drain sequence.
    ///
    /// Runners bound their own in-flight drain by the grace period; the host
    /// allows that plus headroom before giving up on a runner outright.
    async fn drain(&self) {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }

        info!(services = tasks.len(), "waiting for services to drain");
        let deadline = tokio::time::Instant::now()
            + self.config.lifecycle.drain_grace
            + Duration::from_secs(5);

        while let Some(finished) = tokio::time::timeout_at(deadline, tasks.join_next())
            .await
            .ok()
            .flatten()
        {
            match finished {
                Ok((name, Ok(()))) => info!(service = %name, "service shut down cleanly"),
                Ok((name, Err(e))) => {
                    warn!(service = %name, error = %e, "service error during shutdown");
                }
                Err(e) => warn!(error = %e, "service task panicked"),
            }
        }

        if !tasks.is_empty() {
            warn!(
                remaining = tasks.len(),
                "services did not shut down in time, aborting"
            );
            tasks.abort_all();
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("registry", &self.registry)
            .field("broker_connected", &self.broker.initialized())
            .finish_non_exhaustive()
    }
}

/// Completes when a terminating signal arrives, returning its name.
///
/// Interrupt (Ctrl+C) and terminate both map to the same shutdown action.
async fn terminating_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "interrupt",
        () = terminate => "terminate",
    }
}
