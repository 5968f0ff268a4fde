//! The shared Valkey/Redis connection handle.

use std::time::Duration;

use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};

/// Shared handle to the Valkey/Redis coordination store.
///
/// Established at most once per process and shared by reference across every
/// service that needs it. Its lifetime is tied to the host; no component may
/// close or reconstruct it individually.
pub struct Broker {
    pool: Pool,
    client: redis::Client,
    namespace: Option<String>,
    presence_ttl_secs: u64,
}

impl Broker {
    /// Connects to the store, verifying the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] if the pool cannot be built or the
    /// probe fails.
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map_err(|e| BrokerError::Connection(e.to_string()))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        // Test the connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        debug!(url = %config.url, "broker connected");

        Ok(Self {
            pool,
            client,
            namespace: config.namespace.clone(),
            presence_ttl_secs: config.presence_ttl_secs,
        })
    }

    fn prefixed(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key.to_owned(),
        }
    }

    /// The logical channel a service's inbound RPCs travel on.
    ///
    /// Both `publish` and `subscribe` apply the configured namespace on top.
    #[must_use]
    pub fn rpc_channel(service: &str) -> String {
        format!("rpc:{service}")
    }

    /// Publishes a JSON-serialised message on a channel.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] on serialisation or command failure.
    pub async fn publish<T: Serialize>(&self, channel: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let mut conn = self.pool.get().await?;

        conn.publish::<_, _, ()>(self.prefixed(channel), payload)
            .await?;

        Ok(())
    }

    /// Subscribes to a channel on a dedicated pub/sub connection.
    ///
    /// Messages are forwarded into the returned [`Subscription`]; dropping it
    /// tears down the listener and the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] if the pub/sub connection cannot
    /// be established.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let channel = self.prefixed(channel);

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        pubsub.subscribe(&channel).await?;

        let (tx, rx) = mpsc::channel(64);
        let listener_channel = channel.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %listener_channel, error = %e, "dropping unreadable message");
                        continue;
                    }
                };

                if tx.send(payload).await.is_err() {
                    // Subscriber dropped
                    break;
                }
            }
        });

        debug!(channel = %channel, "subscribed");

        Ok(Subscription { channel, rx })
    }

    /// Pushes a JSON-serialised message onto a queue.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] on serialisation or command failure.
    pub async fn enqueue<T: Serialize>(&self, queue: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let mut conn = self.pool.get().await?;

        conn.rpush::<_, _, ()>(self.prefixed(&format!("queue:{queue}")), payload)
            .await?;

        Ok(())
    }

    /// Pops the next message from a queue, blocking up to `timeout`.
    ///
    /// Returns `None` if the queue stayed empty.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] on command or decode failure.
    pub async fn dequeue<T: DeserializeOwned>(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<T>> {
        let mut conn = self.pool.get().await?;

        let entry: Option<(String, Vec<u8>)> = conn
            .blpop(self.prefixed(&format!("queue:{queue}")), timeout.as_secs_f64())
            .await?;

        match entry {
            Some((_, payload)) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    /// Announces this service's presence under a TTL'd key.
    ///
    /// Hosts re-announce on their diagnostics cadence; a key that expires
    /// means the process stopped renewing it.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] on command failure.
    pub async fn announce(&self, service: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;

        conn.set_ex::<_, _, ()>(
            self.prefixed(&format!("presence:{service}")),
            current_timestamp_secs(),
            self.presence_ttl_secs.max(1),
        )
        .await?;

        Ok(())
    }

    /// Withdraws a presence announcement.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] on command failure.
    pub async fn withdraw(&self, service: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;

        conn.del::<_, ()>(self.prefixed(&format!("presence:{service}")))
            .await?;

        Ok(())
    }

    /// Checks whether any process currently announces the named service.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] on command failure.
    pub async fn discover(&self, service: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let exists: bool = conn
            .exists(self.prefixed(&format!("presence:{service}")))
            .await?;

        Ok(exists)
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// A live subscription to a broker channel.
///
/// Dropping the subscription closes the listener task and its connection.
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    /// The (namespaced) channel this subscription listens on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receives the next raw message, or `None` once the channel closes.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Takes an already-buffered message without waiting, if any.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Receives and decodes the next message.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Closed`] once the channel closes, or
    /// [`BrokerError::Serialisation`] for an undecodable payload.
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let payload = self.rx.recv().await.ok_or(BrokerError::Closed)?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

/// Returns the current timestamp in seconds since Unix epoch.
fn current_timestamp_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{RpcReply, RpcRequest};
    use serde_json::json;

    fn test_config() -> BrokerConfig {
        BrokerConfig {
            namespace: Some("meridian-test".to_owned()),
            ..BrokerConfig::default()
        }
    }

    // Integration tests require a running Valkey/Redis instance
    // Run with: cargo test -- --ignored

    #[tokio::test]
    #[ignore = "requires Valkey/Redis instance at 127.0.0.1:6379"]
    async fn publish_and_subscribe() {
        let broker = Broker::connect(&test_config())
            .await
            .expect("Failed to connect to Valkey");

        let mut subscription = broker.subscribe("rpc:echo-test").await.unwrap();

        // Give the listener a moment to attach
        tokio::time::sleep(Duration::from_millis(100)).await;

        let request = RpcRequest::new("echo-test", "echo", json!({ "x": 1 }));
        broker.publish("rpc:echo-test", &request).await.unwrap();

        let received: RpcRequest = tokio::time::timeout(
            Duration::from_secs(2),
            subscription.recv_json(),
        )
        .await
        .expect("timed out waiting for message")
        .unwrap();

        assert_eq!(received.correlation_id, request.correlation_id);
    }

    #[tokio::test]
    #[ignore = "requires Valkey/Redis instance at 127.0.0.1:6379"]
    async fn queue_roundtrip() {
        let broker = Broker::connect(&test_config())
            .await
            .expect("Failed to connect to Valkey");

        let request = RpcRequest::new("worker", "process", json!({ "job": 7 }));
        broker.enqueue("jobs", &request).await.unwrap();

        let popped: Option<RpcRequest> = broker
            .dequeue("jobs", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(popped.unwrap().correlation_id, request.correlation_id);

        // Empty queue times out to None
        let empty: Option<RpcReply> = broker
            .dequeue("jobs", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(empty.is_none());
    }

    #[tokio::test]
    #[ignore = "requires Valkey/Redis instance at 127.0.0.1:6379"]
    async fn presence_lifecycle() {
        let broker = Broker::connect(&test_config())
            .await
            .expect("Failed to connect to Valkey");

        let _ = broker.withdraw("presence-test").await;
        assert!(!broker.discover("presence-test").await.unwrap());

        broker.announce("presence-test").await.unwrap();
        assert!(broker.discover("presence-test").await.unwrap());

        broker.withdraw("presence-test").await.unwrap();
        assert!(!broker.discover("presence-test").await.unwrap());
    }
}
