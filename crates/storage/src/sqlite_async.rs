//! Async trait implementations for `SqliteStore` via `spawn_blocking`.

use async_trait::async_trait;
use queryloom_core::{KnowledgeInput, KnowledgeItem, LearningInput, LearningItem};

use crate::error::StorageError;
use crate::sqlite::SqliteStore;
use crate::traits::{KnowledgeStore, LearningStore};

/// Run a blocking closure on the tokio blocking pool.
async fn blocking<F, T>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| StorageError::Join(e.to_string()))?
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn save_knowledge(&self, input: KnowledgeInput) -> Result<KnowledgeItem, StorageError> {
        let store = self.clone();
        blocking(move || store.save_knowledge_sync(input)).await
    }

    async fn get_knowledge(&self, id: &str) -> Result<Option<KnowledgeItem>, StorageError> {
        let store = self.clone();
        let id = id.to_owned();
        blocking(move || store.get_knowledge_sync(&id)).await
    }

    async fn list_knowledge(
        &self,
        table_scope: Option<&[String]>,
    ) -> Result<Vec<KnowledgeItem>, StorageError> {
        let store = self.clone();
        let scope = table_scope.map(<[String]>::to_vec);
        blocking(move || store.list_knowledge_sync(scope.as_deref())).await
    }

    async fn supersede_knowledge(&self, old_id: &str, new_id: &str) -> Result<(), StorageError> {
        let store = self.clone();
        let old_id = old_id.to_owned();
        let new_id = new_id.to_owned();
        blocking(move || store.supersede_knowledge_sync(&old_id, &new_id)).await
    }
}

#[async_trait]
impl LearningStore for SqliteStore {
    async fn save_learning(&self, input: LearningInput) -> Result<LearningItem, StorageError> {
        let store = self.clone();
        blocking(move || store.save_learning_sync(input)).await
    }

    async fn get_learning(&self, id: &str) -> Result<Option<LearningItem>, StorageError> {
        let store = self.clone();
        let id = id.to_owned();
        blocking(move || store.get_learning_sync(&id)).await
    }

    async fn list_learning(
        &self,
        table_scope: Option<&[String]>,
    ) -> Result<Vec<LearningItem>, StorageError> {
        let store = self.clone();
        let scope = table_scope.map(<[String]>::to_vec);
        blocking(move || store.list_learning_sync(scope.as_deref())).await
    }

    async fn supersede_learning(&self, old_id: &str, new_id: &str) -> Result<(), StorageError> {
        let store = self.clone();
        let old_id = old_id.to_owned();
        let new_id = new_id.to_owned();
        blocking(move || store.supersede_learning_sync(&old_id, &new_id)).await
    }
}
