//! The RPC error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned to RPC callers.
///
/// These are always recoverable from the host's perspective: a failed call is
/// surfaced to its caller and never takes down the process or the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcError {
    /// No method with this name exists on the target service.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The argument bag does not satisfy the method's shape contract.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// An uncaught fault occurred during execution.
    ///
    /// The underlying detail is logged host-side and never leaks to the caller.
    #[error("internal error")]
    Internal,

    /// The service cannot take calls: startup failed or shutdown is in progress.
    #[error("service unavailable")]
    ServiceUnavailable,
}

/// Wire error codes for RPC failures.
///
/// Codes are grouped by category:
/// - 20-39: dispatch errors
/// - 50-59: internal errors
impl RpcError {
    /// Returns the stable wire code for this error.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::MethodNotFound(_) => 20,
            Self::InvalidArguments(_) => 21,
            Self::ServiceUnavailable => 22,
            Self::Internal => 50,
        }
    }

    /// Returns the variant detail carried on the wire.
    ///
    /// Empty for the variants that intentionally carry none.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::MethodNotFound(detail) | Self::InvalidArguments(detail) => detail,
            Self::Internal | Self::ServiceUnavailable => "",
        }
    }

    /// Reconstructs an error from a wire code and detail message.
    ///
    /// Unknown codes collapse to [`RpcError::Internal`] so that a newer peer
    /// never crashes an older one.
    #[must_use]
    pub fn from_code(code: u8, detail: &str) -> Self {
        match code {
            20 => Self::MethodNotFound(detail.to_owned()),
            21 => Self::InvalidArguments(detail.to_owned()),
            22 => Self::ServiceUnavailable,
            _ => Self::Internal,
        }
    }

    /// Checks if this is a dispatch error (20-39).
    #[must_use]
    pub const fn is_dispatch_error(&self) -> bool {
        matches!(self.code(), 20..=39)
    }

    /// Checks if this is an internal error (50-59).
    #[must_use]
    pub const fn is_internal_error(&self) -> bool {
        matches!(self.code(), 50..=59)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        let errors = [
            RpcError::MethodNotFound("greet".to_owned()),
            RpcError::InvalidArguments("missing field `name`".to_owned()),
            RpcError::ServiceUnavailable,
            RpcError::Internal,
        ];

        for error in errors {
            let restored = RpcError::from_code(error.code(), error.detail());
            assert_eq!(restored, error);
        }
    }

    #[test]
    fn unknown_code_collapses_to_internal() {
        assert_eq!(RpcError::from_code(99, "whatever"), RpcError::Internal);
    }

    #[test]
    fn error_code_categories() {
        assert!(RpcError::MethodNotFound(String::new()).is_dispatch_error());
        assert!(RpcError::ServiceUnavailable.is_dispatch_error());
        assert!(RpcError::Internal.is_internal_error());
        assert!(!RpcError::Internal.is_dispatch_error());
    }
}
