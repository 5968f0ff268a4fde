//! Error types for the broker.

use thiserror::Error;

/// Broker errors.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Failed to establish or obtain a connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backing store rejected a command.
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// A remote call did not complete in time.
    #[error("rpc timed out")]
    Timeout,

    /// The subscription or channel was closed.
    #[error("channel closed")]
    Closed,
}

impl From<deadpool_redis::PoolError> for BrokerError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
