//! Error types for feeder construction and the umbrella error used at API
//! boundaries.
//!
//! [`NetworkError`] is raised while validating input tables, always before
//! any numerical work. [`DistError`] wraps it together with I/O and parsing
//! failures so loaders and front ends can use a single `?` chain.

use thiserror::Error;

/// Construction-time errors for nodes, lines and topology.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// Duplicate or unknown references, cycles, or components without
    /// exactly one slack node
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// Missing, non-numeric or unclassifiable node fields
    #[error("invalid node data ({entity}): {reason}")]
    InvalidNodeData { entity: String, reason: String },

    /// Missing, non-numeric or physically impossible line fields
    #[error("invalid line data ({entity}): {reason}")]
    InvalidLineData { entity: String, reason: String },

    /// Scalar configuration that cannot produce a voltage window
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NetworkError {
    pub fn node(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        NetworkError::InvalidNodeData {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn line(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        NetworkError::InvalidLineData {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Unified error type for loaders and front ends.
#[derive(Error, Debug)]
pub enum DistError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Feeder validation errors
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Convenience type alias for Results using DistError.
pub type DistResult<T> = Result<T, DistError>;
