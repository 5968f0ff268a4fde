//! Core service contract for Meridian.
//!
//! This crate defines the in-process contract every hosted service satisfies:
//!
//! - **Service**: the capability set {startup, rpc-dispatch, diagnostics, shutdown}
//! - **Dispatch**: explicit method tables mapping names to async handlers
//! - **Errors**: the typed RPC failure taxonomy surfaced to callers

pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod service;

pub use diagnostics::{Diagnosis, Verdict};
pub use dispatch::{Args, HandlerError, MethodTable, MethodTableBuilder};
pub use error::RpcError;
pub use service::{Service, ServiceError};
