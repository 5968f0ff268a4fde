//! Self-diagnostics types reported by hosted services.

use serde::{Deserialize, Serialize};

/// The outcome of a service's self-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Operating normally.
    Ok,
    /// Operational but impaired.
    Degraded,
    /// Unable to do useful work.
    Fatal,
}

impl Verdict {
    /// Returns true if the service can still take calls.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Ok | Self::Degraded)
    }

    /// Returns true if this verdict should flip process readiness.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Degraded => write!(f, "degraded"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A diagnosis produced by a service's self-check hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// The verdict.
    pub verdict: Verdict,
    /// Optional human-readable detail.
    pub detail: Option<String>,
}

impl Diagnosis {
    /// A healthy diagnosis with no detail.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            verdict: Verdict::Ok,
            detail: None,
        }
    }

    /// A degraded diagnosis with detail.
    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Degraded,
            detail: Some(detail.into()),
        }
    }

    /// A fatal diagnosis with detail.
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fatal,
            detail: Some(detail.into()),
        }
    }
}

impl Default for Diagnosis {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability() {
        assert!(Verdict::Ok.is_available());
        assert!(Verdict::Degraded.is_available());
        assert!(!Verdict::Fatal.is_available());
    }

    #[test]
    fn constructors() {
        assert_eq!(Diagnosis::ok().verdict, Verdict::Ok);
        assert!(Diagnosis::ok().detail.is_none());

        let degraded = Diagnosis::degraded("queue lag above threshold");
        assert_eq!(degraded.verdict, Verdict::Degraded);
        assert!(degraded.detail.is_some());

        assert!(Diagnosis::fatal("lost backing store").verdict.is_fatal());
    }
}
