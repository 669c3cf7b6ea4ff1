use conduit_core::{ConduitError, Kind};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Cannot resolve {context}: {kind} '{name}' not found in namespace '{namespace}'")]
    Unresolved { context: &'static str, kind: Kind, name: String, namespace: String },
    #[error("no transformer registered for {0}")]
    Unsupported(Kind),
    #[error("transformer for {expected} received a {actual}")]
    KindMismatch { expected: Kind, actual: Kind },
}

impl From<TransformError> for ConduitError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::Unresolved { .. } => ConduitError::UnresolvedReference(e.to_string()),
            other => ConduitError::Protocol(other.to_string()),
        }
    }
}
