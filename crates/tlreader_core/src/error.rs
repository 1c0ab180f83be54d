//! Error types for the timeline reader.

use thiserror::Error;
use tlreader_storage::StorageError;

/// Result type for reader operations.
pub type ReaderResult<T> = Result<T, ReaderError>;

/// Errors that can occur in reader operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The liveness gate is closed: the backend is presumed down.
    #[error("storage unavailable: {cause}")]
    StorageUnavailable {
        /// Label of the storage backend.
        storage: String,
        /// Human-readable cause.
        cause: String,
    },

    /// The request context or filters are malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A single-entity read found nothing.
    #[error("entity not found: {entity_type}/{entity_id}")]
    NotFound {
        /// Requested entity type.
        entity_type: String,
        /// Requested entity id.
        entity_id: String,
    },

    /// The backend failed while serving a read that passed the gate.
    #[error("storage I/O failure: {0}")]
    Io(#[from] StorageError),

    /// Operation invoked outside the lifecycle state that permits it.
    #[error("cannot {operation} while reader is {state}")]
    IllegalState {
        /// The attempted operation.
        operation: &'static str,
        /// The lifecycle state at the time.
        state: String,
    },

    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ReaderError {
    /// Creates an invalid-request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns true if the liveness gate rejected the call.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReaderError::StorageUnavailable { .. })
    }

    /// Returns true if the caller may retry later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReaderError::StorageUnavailable { .. } => true,
            ReaderError::Io(e) => e.is_transient(),
            _ => false,
        }
    }
}
