//! Async store contracts
//!
//! The engine and the retrieval index reach storage only through these
//! traits, so alternative backends can be swapped in behind the same
//! idempotency contract.

use async_trait::async_trait;
use queryloom_core::{KnowledgeInput, KnowledgeItem, LearningInput, LearningItem};

use crate::error::StorageError;

/// Curated knowledge operations.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Idempotent append. Returns the existing item when the content hash
    /// already exists; two racing writers both receive the winner's row.
    async fn save_knowledge(&self, input: KnowledgeInput) -> Result<KnowledgeItem, StorageError>;

    async fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeItem>, StorageError>;

    /// Non-superseded items, newest first, optionally restricted to items
    /// tagged with at least one of `table_scope`.
    async fn list_knowledge(
        &self,
        table_scope: Option<&[String]>,
    ) -> Result<Vec<KnowledgeItem>, StorageError>;

    /// Record that `new_id` supersedes `old_id`. Link only; the old row
    /// is retained for audit and must not already be superseded.
    async fn supersede_knowledge(&self, old_id: &str, new_id: &str) -> Result<(), StorageError>;
}

/// Runtime-discovered correction operations.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Idempotent append, same contract as [`KnowledgeStore::save_knowledge`].
    async fn save_learning(&self, input: LearningInput) -> Result<LearningItem, StorageError>;

    async fn get_learning(&self, id: &str) -> Result<Option<LearningItem>, StorageError>;

    /// Non-superseded items, newest first, optionally restricted by
    /// affected table.
    async fn list_learning(
        &self,
        table_scope: Option<&[String]>,
    ) -> Result<Vec<LearningItem>, StorageError>;

    async fn supersede_learning(&self, old_id: &str, new_id: &str) -> Result<(), StorageError>;
}
