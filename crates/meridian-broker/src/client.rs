//! Client side of broker-carried RPC.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use meridian_core::RpcError;

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::message::{RpcReply, RpcRequest};

/// Calls hosted services across processes via the broker.
#[derive(Debug, Clone)]
pub struct RpcClient {
    broker: Arc<Broker>,
    timeout: Duration,
}

impl RpcClient {
    /// Creates a client over a shared broker handle.
    #[must_use]
    pub fn new(broker: Arc<Broker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Invokes `method` on the named service and awaits the correlated reply.
    ///
    /// The reply carries either the method's JSON result or a typed
    /// [`RpcError`]; transport faults and the call deadline surface as
    /// [`BrokerError`].
    ///
    /// # Errors
    ///
    /// - [`BrokerError::Timeout`] if no reply arrives within the configured
    ///   deadline
    /// - any other [`BrokerError`] for transport faults
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        args: Value,
    ) -> Result<std::result::Result<Value, RpcError>> {
        let request = RpcRequest::new(service, method, args);

        // Subscribe to the reply channel before publishing so the reply
        // cannot slip past us.
        let mut replies = self.broker.subscribe(&request.reply_to).await?;

        self.broker
            .publish(&Broker::rpc_channel(service), &request)
            .await?;

        debug!(
            service = %service,
            method = %method,
            correlation_id = %request.correlation_id,
            "rpc request published"
        );

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let reply: RpcReply =
                match tokio::time::timeout_at(deadline, replies.recv_json()).await {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(BrokerError::Timeout),
                };

            // Another caller's reply on a colliding channel is ignored.
            if reply.correlation_id == request.correlation_id {
                return Ok(reply.into_result());
            }
        }
    }
}
