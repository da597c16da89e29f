//! Error types for collaborator operations.

use thiserror::Error;

use crate::ids::{SnapshotToken, ValueSpecification};

/// Common error type for collaborator operations.
#[derive(Debug, Error)]
pub enum TraitError {
    /// Requested snapshot is unknown or was already released
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(SnapshotToken),

    /// Source not available
    #[error("source not available: {0}")]
    SourceNotAvailable(String),

    /// Parse/deserialization error
    #[error("parse error: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TraitError {
    fn from(e: std::io::Error) -> Self {
        TraitError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for TraitError {
    fn from(e: serde_json::Error) -> Self {
        TraitError::ParseError(e.to_string())
    }
}

/// Fault raised by a calculation function.
///
/// Faults never cross a node boundary: the engine logs them and marks the
/// node failed.
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    /// A required input was not supplied to the function
    #[error("missing input: {0}")]
    MissingInput(ValueSpecification),

    /// The input had an unexpected payload shape
    #[error("unexpected payload for {spec}: expected {expected}")]
    UnexpectedPayload {
        /// Offending input
        spec: ValueSpecification,
        /// Expected payload kind
        expected: &'static str,
    },

    /// Numerical or business failure inside the calculation
    #[error("calculation error: {0}")]
    Calculation(String),

    /// The function returned outputs it did not declare, or none at all
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The function is not meant to be executed by the engine
    #[error("not executable: {0}")]
    NotExecutable(String),
}

impl FunctionError {
    /// Creates a calculation error.
    pub fn calculation(msg: impl Into<String>) -> Self {
        Self::Calculation(msg.into())
    }
}
