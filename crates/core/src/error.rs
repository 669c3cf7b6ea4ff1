use thiserror::Error;

use crate::ObjectKey;

/// Error taxonomy shared across crates.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// User input violates an ownership, required-field or immutability rule.
    #[error("{0}")]
    Validation(String),
    #[error("Resource already exists: {0}")]
    AlreadyExists(ObjectKey),
    #[error("Resource not found: {0}")]
    NotFound(ObjectKey),
    /// A referenced resource is absent while transforming.
    #[error("{0}")]
    UnresolvedReference(String),
    #[error("{0}")]
    ExternalTool(String),
    /// Malformed admission payload or wire object.
    #[error("{0}")]
    Protocol(String),
    /// Missing credentials, certificates or bad settings at startup.
    #[error("{0}")]
    Configuration(String),
    /// Reference lookup against a backend failed for reasons other than absence.
    #[error("lookup of {key} failed: {reason}")]
    Lookup { key: ObjectKey, reason: String },
}

pub type Result<T, E = ConduitError> = std::result::Result<T, E>;
