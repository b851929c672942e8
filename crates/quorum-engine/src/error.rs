use quorum_policy::ValidationResult;
use quorum_storage::StorageError;
use thiserror::Error;

/// Result type for write operations.
pub type WriteResult<T> = Result<T, WriteError>;

/// Errors surfaced by the write coordinator.
///
/// Policy verdicts are not errors in the storage sense: a blocked write
/// comes back as `Rejected` carrying the full validation result, so the
/// caller can render every blocking reason.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A lost race or a write against stale state: a non-pending decide,
    /// a transition made extinct between propose and decide, a duplicate
    /// entity id.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("write rejected: {}", .0.summary())]
    Rejected(ValidationResult),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StorageError> for WriteError {
    fn from(error: StorageError) -> Self {
        // NotFound and Conflict keep their meaning across the layer
        // boundary; everything else is an opaque storage failure.
        match error {
            StorageError::NotFound(message) => WriteError::NotFound(message),
            StorageError::Conflict(message) => WriteError::Conflict(message),
            other => WriteError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for WriteError {
    fn from(error: serde_json::Error) -> Self {
        WriteError::Serialization(error.to_string())
    }
}
