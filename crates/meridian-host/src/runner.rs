//! The per-service owning task.
//!
//! Each registered service is attached to the event loop as one runner task.
//! The runner drives the service's lifecycle: startup hook, broker
//! subscription for inbound RPCs, periodic diagnostics, and the drain
//! sequence once the shutdown signal resolves. The runner's `Arc` is the
//! owning reference behind the registry's weak entry, so a completed runner
//! decays the service out of lookups.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use meridian_broker::{Broker, RpcReply, RpcRequest, Subscription};
use meridian_core::{Args, RpcError, Service, ServiceError};

use crate::health::{HealthTracker, ServicePhase};
use crate::shutdown::ShutdownSignal;

pub(crate) struct ServiceRunner {
    pub(crate) service: Arc<dyn Service>,
    pub(crate) health: Arc<HealthTracker>,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) broker: Option<Arc<Broker>>,
    pub(crate) diagnostics_interval: Duration,
    pub(crate) drain_grace: Duration,
}

impl ServiceRunner {
    /// Drives the service until the shutdown signal resolves and the drain
    /// sequence completes.
    pub(crate) async fn run(self) -> Result<(), ServiceError> {
        let name = self.service.name().to_owned();

        // Startup hook: guaranteed to finish before any dispatch.
        if let Err(e) = self.service.startup().await {
            error!(service = %name, error = %e, "service startup failed");
            self.health.set_phase(&name, ServicePhase::Failed);
            return Err(e);
        }

        let mut inbound = self.subscribe_inbound(&name).await;

        self.health.set_phase(&name, ServicePhase::Ready);
        info!(service = %name, "service started");

        let mut ticker = tokio::time::interval(self.diagnostics_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup isn't double-checked.
        ticker.tick().await;

        let mut calls: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                () = self.shutdown.resolved() => break,

                _ = ticker.tick() => {
                    let diagnosis = self.service.diagnose().await;
                    self.health.record_diagnosis(&name, diagnosis);

                    if let Some(broker) = &self.broker {
                        if let Err(e) = broker.announce(&name).await {
                            debug!(service = %name, error = %e, "presence renewal failed");
                        }
                    }
                }

                payload = next_inbound(&mut inbound) => {
                    match payload {
                        Some(payload) => self.spawn_call(&name, &mut calls, &payload),
                        None => {
                            warn!(service = %name, "inbound rpc subscription closed");
                            inbound = None;
                        }
                    }
                }

                Some(finished) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(service = %name, "rpc call task panicked");
                        }
                    }
                }
            }
        }

        self.drain(&name, inbound, calls).await
    }

    /// Subscribes to the service's RPC channel and announces its presence.
    ///
    /// A broker failure downgrades the service to in-process dispatch only;
    /// it does not fail the service.
    async fn subscribe_inbound(&self, name: &str) -> Option<Subscription> {
        let broker = self.broker.as_ref()?;

        let subscription = match broker.subscribe(&Broker::rpc_channel(name)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(
                    service = %name,
                    error = %e,
                    "broker subscription failed, serving in-process calls only"
                );
                return None;
            }
        };

        if let Err(e) = broker.announce(name).await {
            warn!(service = %name, error = %e, "presence announcement failed");
        }

        Some(subscription)
    }

    /// Decodes an inbound request and runs it in its own task.
    ///
    /// Calls interleave freely; the runner never serialises them.
    fn spawn_call(&self, name: &str, calls: &mut JoinSet<()>, payload: &[u8]) {
        let request: RpcRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                // No reply channel is recoverable from an unreadable payload.
                warn!(service = %name, error = %e, "dropping undecodable rpc request");
                return;
            }
        };

        let service = Arc::clone(&self.service);
        let broker = self.broker.clone();
        calls.spawn(async move {
            let result = match Args::from_value(request.args.clone()) {
                Ok(args) => service.methods().dispatch(&request.method, args).await,
                Err(e) => Err(e),
            };

            if let Some(broker) = broker {
                let reply = RpcReply::to_request(&request, result);
                if let Err(e) = broker.publish(&request.reply_to, &reply).await {
                    warn!(
                        correlation_id = %request.correlation_id,
                        error = %e,
                        "failed to publish rpc reply"
                    );
                }
            }
        });
    }

    /// The drain sequence: stop accepting, reject buffered requests, let
    /// in-flight calls finish within the grace period, then stop the service.
    async fn drain(
        &self,
        name: &str,
        inbound: Option<Subscription>,
        mut calls: JoinSet<()>,
    ) -> Result<(), ServiceError> {
        self.health.set_phase(name, ServicePhase::Draining);
        info!(service = %name, in_flight = calls.len(), "service draining");

        if let Some(broker) = &self.broker {
            if let Err(e) = broker.withdraw(name).await {
                debug!(service = %name, error = %e, "presence withdrawal failed");
            }
        }

        // Requests already buffered when shutdown arrived get a reply rather
        // than silently vanishing.
        if let Some(mut subscription) = inbound {
            while let Some(payload) = subscription.try_recv() {
                self.reject_unavailable(name, &payload).await;
            }
        }

        let deadline = tokio::time::Instant::now() + self.drain_grace;
        while let Some(finished) = tokio::time::timeout_at(deadline, calls.join_next())
            .await
            .ok()
            .flatten()
        {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!(service = %name, "rpc call task panicked during drain");
                }
            }
        }

        if !calls.is_empty() {
            warn!(
                service = %name,
                aborted = calls.len(),
                "drain grace period elapsed, aborting in-flight calls"
            );
            calls.abort_all();
        }

        let stopped = self.service.stop().await;
        self.health.set_phase(name, ServicePhase::Stopped);

        match stopped {
            Ok(()) => {
                info!(service = %name, "service stopped");
                Ok(())
            }
            Err(e) => {
                warn!(service = %name, error = %e, "service stop hook failed");
                Err(e)
            }
        }
    }

    /// Replies `ServiceUnavailable` to a request that arrived after shutdown.
    async fn reject_unavailable(&self, name: &str, payload: &[u8]) {
        let Ok(request) = serde_json::from_slice::<RpcRequest>(payload) else {
            return;
        };

        debug!(
            service = %name,
            method = %request.method,
            "rejecting rpc received during drain"
        );

        if let Some(broker) = &self.broker {
            let reply = RpcReply::to_request(&request, Err(RpcError::ServiceUnavailable));
            if let Err(e) = broker.publish(&request.reply_to, &reply).await {
                warn!(
                    correlation_id = %request.correlation_id,
                    error = %e,
                    "failed to publish drain rejection"
                );
            }
        }
    }
}

/// Yields the next inbound payload, or pends forever without a subscription.
async fn next_inbound(inbound: &mut Option<Subscription>) -> Option<Vec<u8>> {
    match inbound {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
