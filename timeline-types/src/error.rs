//! Error types for timeline value objects.

use thiserror::Error;

/// Errors raised while constructing timeline identity types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Profile identifier is empty or malformed.
    #[error("invalid profile id: {0:?}")]
    InvalidProfileId(String),

    /// Record URI does not use the `at://` scheme.
    #[error("invalid record uri: {0:?}")]
    InvalidUri(String),

    /// Source identifier is empty.
    #[error("invalid source id: {0:?}")]
    InvalidSourceId(String),

    /// Stored timeline kind could not be recognised.
    #[error("unknown timeline kind: {0}")]
    UnknownKind(String),
}
