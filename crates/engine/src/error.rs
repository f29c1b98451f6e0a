//! Typed error enum for the engine layer.
//!
//! Violations, classified execution errors, and draft unavailability are
//! absorbed into the repair loop and never appear here; a session that
//! runs out of retries still returns `Ok` with a `FailedExhausted` status
//! and its full attempt trace. What remains are infrastructure failures
//! and misuse of the persistence contract.

use queryloom_retrieval::RetrievalError;
use queryloom_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Persistence called on a session that is not in the required state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A required collaborator was not wired in at construction.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Caller cancelled the session between state transitions.
    #[error("session cancelled")]
    Cancelled,

    /// Store read/write failed outside the repair loop.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Retrieval failed (storage-level; embedding failures degrade silently).
    #[error("retrieval: {0}")]
    Retrieval(#[from] RetrievalError),
}
