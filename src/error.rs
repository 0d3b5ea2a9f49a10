//! Error types

use thiserror::Error;

use crate::types::ChallengeKind;

/// Errors surfaced by the gating core
#[derive(Debug, Clone, Error)]
pub enum GateError {
    /// The detection model cannot be queried; fatal to the loop
    #[error("Detection model unavailable: {0}")]
    ModelUnavailable(String),

    /// No sample arrived within the expected window
    #[error("No sample within {0} ms")]
    SampleTimeout(u64),

    /// A liveness challenge was not completed in time
    #[error("Challenge {kind} timed out after {timeout_ms} ms")]
    ChallengeTimeout { kind: ChallengeKind, timeout_ms: u64 },

    /// Out-of-range configuration supplied at construction
    #[error("Invalid configuration: {field} = {value} ({reason})")]
    ConfigInvalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

impl GateError {
    /// Only model failures stop the loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, GateError::ModelUnavailable(_))
    }
}

/// Errors a sample source may report for a single query
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Model or device gone; the loop stops
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// One bad frame; treated as a no-face sample
    #[error("Transient source failure: {0}")]
    Transient(String),

    /// Source did not answer in time; treated as a no-face sample
    #[error("Source timed out")]
    Timeout,

    /// Stream ended; the loop stops without an error state
    #[error("Source closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, GateError>;
