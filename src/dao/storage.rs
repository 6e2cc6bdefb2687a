use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Context for the failure.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A conditional write found a different version than expected.
    #[error("write conflict on `{key}`")]
    Conflict {
        /// Key of the contested record.
        key: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict for the record stored under `key`.
    pub fn conflict(key: impl Into<String>) -> Self {
        StorageError::Conflict { key: key.into() }
    }
}
