//! The hosted-service capability set.

use async_trait::async_trait;
use thiserror::Error;

use crate::diagnostics::Diagnosis;
use crate::dispatch::MethodTable;

/// Errors from a service's lifecycle hooks.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The hook failed.
    #[error("service failed: {0}")]
    Failed(String),

    /// The service was cancelled before it could finish.
    #[error("service cancelled")]
    Cancelled,

    /// An arbitrary error from service code.
    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ServiceError {
    /// Wraps a failure message.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }
}

/// A unit hosted by the process: named RPC methods plus lifecycle hooks.
///
/// Every hook has a default so a minimal service only supplies its name and
/// method table. The host drives the hooks; services never call them on each
/// other.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// The process-unique name this service registers under.
    fn name(&self) -> &str;

    /// The service's RPC method table, built once at construction time.
    fn methods(&self) -> &MethodTable;

    /// Runs once after registration, before any RPC is dispatched.
    ///
    /// A failure here marks the service unavailable; the host keeps running
    /// its other services.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] describing why startup failed.
    async fn startup(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Read-only self-check, invoked periodically and on demand.
    ///
    /// Must not block on in-flight RPCs and must not mutate state visible to
    /// concurrent calls.
    async fn diagnose(&self) -> Diagnosis {
        Diagnosis::ok()
    }

    /// Releases resources once the service has stopped accepting calls and
    /// in-flight work has drained.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`]; the host logs it and continues shutdown.
    async fn stop(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
