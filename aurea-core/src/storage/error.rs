//! Error types for session storage backends.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by [`KeyValueStore`](super::KeyValueStore) implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend refuses to be used at all (disabled by policy, poisoned
    /// lock, missing directory).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An I/O operation failed.
    #[error("{context}: {source}")]
    Io {
        /// Context describing the operation.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be decoded.
    #[error("corrupted store: {context}")]
    Corrupted {
        /// Description of the corruption.
        context: String,
    },
}

impl StorageError {
    /// Builds an [`StorageError::Io`] with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
