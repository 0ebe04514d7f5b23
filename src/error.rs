//! Error types for the Directus operator

use std::time::Duration;

use thiserror::Error;

/// Main error type for Directus operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A field the reconciler depends on is absent (e.g. uid, namespace)
    #[error("missing field: {0}")]
    MissingField(String),

    /// The caller abandoned the reconciliation pass
    #[error("reconciliation cancelled")]
    Cancelled,

    /// The reconciliation pass exceeded its time budget
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a missing field error naming the absent field
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Returns true if this error is an API server 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// Returns true if the pass was abandoned by its caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
