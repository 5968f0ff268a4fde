//! Service host runtime for Meridian.
//!
//! The host owns zero or more [`meridian_core::Service`] instances, indexed
//! by name in a weak (non-owning) registry, multiplexes their RPC surfaces
//! and periodic diagnostics onto the event loop, and guarantees a
//! deterministic, idempotent shutdown sequence triggered by terminating
//! signals or an explicit request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use meridian_host::{Host, HostConfig};
//! # async fn example(my_service: Arc<dyn meridian_core::Service>) -> Result<(), meridian_host::HostError> {
//! let host = Host::new(HostConfig::default());
//! host.add_service(my_service).await?;
//! host.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod health;
pub mod host;
pub mod registry;
mod runner;
pub mod shutdown;

pub use config::{ConfigError, HostConfig};
pub use health::{HealthTracker, ServiceHealth, ServicePhase};
pub use host::{Host, HostError};
pub use registry::{DuplicatePolicy, Provenance, RegistryError, ServiceRegistry};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
