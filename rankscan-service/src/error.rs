//! Error taxonomy for the service layer.
//!
//! Insufficient history is deliberately absent: short windows mark the
//! affected metric unavailable instead of erroring. Nothing here
//! terminates the process; cycle-level failures surface as
//! `CycleError` to the coordinator's caller.

use thiserror::Error;

/// Failures at the snapshot-source boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Retryable: network timeout, transient upstream failure.
    #[error("transient source error: {0}")]
    Transient(String),

    /// Fatal to the cycle: credentials rejected. Not retried.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Malformed query parameters, rejected before touching cache or
/// engines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A cycle that could not be completed and published.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("snapshot fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("cycle exceeded deadline: {elapsed_ms}ms > {budget_ms}ms, results discarded")]
    DeadlineExceeded { elapsed_ms: u64, budget_ms: u64 },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
