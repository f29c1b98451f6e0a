//! Typed error enum for the storage layer.

use thiserror::Error;

/// Storage-layer error with variants covering every expected failure mode.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Row not found for expected-present entity.
    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    /// Attempted state change that the append-only contract forbids.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// SQL / connection failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Row data could not be deserialized into a domain type.
    #[error("data corruption: {context}")]
    DataCorruption {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Connection mutex was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Background task running the blocking call was cancelled or panicked.
    #[error("blocking task join error: {0}")]
    Join(String),

    /// Migration failure.
    #[error("migration error: {0}")]
    Migration(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataCorruption {
            context: "JSON serialization/deserialization".to_owned(),
            source: Box::new(err),
        }
    }
}
