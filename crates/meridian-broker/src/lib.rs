//! Valkey/Redis coordination broker for Meridian.
//!
//! This crate is the transport collaborator at the host's boundary:
//!
//! - **Broker**: a connection handle established once per process and shared
//!   by reference, with pub/sub messaging, queue primitives and presence keys
//! - **Messages**: the structured RPC request/reply envelopes carried over
//!   the broker
//! - **RpcClient**: calls a hosted service from another process

pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod message;

pub use broker::{Broker, Subscription};
pub use client::RpcClient;
pub use config::BrokerConfig;
pub use error::BrokerError;
pub use message::{ReplyResult, RpcReply, RpcRequest};
