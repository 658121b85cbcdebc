//! Error types for the orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::Capability;

/// Result type alias for the orchestrator
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider unavailable (circuit open or rate-limited)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider call timed out
    #[error("Provider timeout: {0}")]
    ProviderTimeout(String),

    /// Transport-level failure reaching the provider
    #[error("Provider transport error: {0}")]
    ProviderTransport(String),

    /// Provider returned a non-success response
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    /// No registered provider supports the capability
    #[error("No capable provider for {0}")]
    NoCapableProvider(Capability),

    /// Every capable provider was tried and failed
    #[error("All providers exhausted for {capability} ({} tried)", .failures.len())]
    AllProvidersExhausted {
        /// Capability that could not be satisfied
        capability: Capability,
        /// Per-provider failures, in the order providers were attempted
        failures: Vec<ProviderFailure>,
    },

    /// The caller's deadline expired before any provider could be attempted
    #[error("Request deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Classify this error for metrics, if it maps to an attempt failure.
    ///
    /// Returns `None` for errors that never correspond to a completed
    /// provider attempt (config errors, admission denials, aggregates).
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::ProviderTimeout(_) => Some(FailureKind::Timeout),
            Self::ProviderTransport(_) => Some(FailureKind::Transport),
            Self::ProviderRejected(_) => Some(FailureKind::Rejected),
            _ => None,
        }
    }

    /// Whether the failover loop may try again after this error.
    ///
    /// Timeouts and transport faults are transient; a rejection is a
    /// definitive answer from the provider and surfaces immediately so the
    /// caller can fail over instead of consuming the retry budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTimeout(_) | Self::ProviderTransport(_))
    }
}

/// Attempt failure classification used by the metrics recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Call exceeded the per-call timeout
    Timeout,
    /// Connection-level failure (DNS, TLS, reset, ...)
    Transport,
    /// Provider answered with a non-success response
    Rejected,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One provider's terminal failure within an exhausted request
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    /// Provider identifier
    pub provider_id: String,
    /// Rendered last error for that provider
    pub error: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider_id, self.error)
    }
}
