//! Error types for the reconciliation engine

use roster_core::ApiError;

/// Result type alias for engine and state-store operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Source or target adapter errors
    #[error(transparent)]
    Api(#[from] ApiError),

    /// IO errors from the file-backed store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted cursor exists but cannot be interpreted
    #[error("Malformed cursor in {store}: {message}")]
    MalformedCursor { store: String, message: String },

    /// The state backend rejected a read or write
    #[error("State store error ({store}): {message}")]
    StateStore { store: String, message: String },
}

impl SyncError {
    pub fn malformed(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCursor {
            store: store.into(),
            message: message.into(),
        }
    }

    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateStore {
            store: store.into(),
            message: message.into(),
        }
    }
}
