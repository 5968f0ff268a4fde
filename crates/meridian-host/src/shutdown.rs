//! The process-wide shutdown coordinator.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// Coordinates the single, process-wide "begin graceful stop" event.
///
/// The underlying signal is created lazily on first access and resolves at
/// most once; resolving again is a harmless no-op. Observers receive
/// [`ShutdownSignal`] views that cannot cancel, suppress or rewind the
/// resolution.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: OnceLock<CancellationToken>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with an uninitialised signal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            token: OnceLock::new(),
        }
    }

    /// Returns an observable view of the shutdown signal, creating the
    /// underlying signal on first access.
    ///
    /// Repeated calls return equivalent views of the same signal.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.get_or_init(CancellationToken::new).clone(),
        }
    }

    /// Returns true once the signal has been created.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.token.get().is_some()
    }

    /// Resolves the signal, waking every observer exactly once.
    ///
    /// Idempotent: resolving an already-resolved signal is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if called before the signal was ever initialised via
    /// [`ShutdownCoordinator::signal`]. That is a programming-order fault in
    /// the caller's sequencing, not a runtime condition to recover from.
    pub fn resolve(&self) -> ShutdownSignal {
        let token = self
            .token
            .get()
            .expect("shutdown requested before the host initialised its signal");

        token.cancel();

        ShutdownSignal {
            token: token.clone(),
        }
    }
}

/// A read-only, non-cancellable view of the shutdown signal.
///
/// Holders can observe resolution but never force or undo it; only the
/// [`ShutdownCoordinator`] resolves.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Completes once the signal resolves.
    ///
    /// Completes immediately if it already has. Dropping the future has no
    /// effect on the signal.
    pub async fn resolved(&self) {
        self.token.cancelled().await;
    }

    /// Returns true once the signal has resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.token.is_cancelled()
    }
}
