//! Hybrid retrieval over the knowledge and learning stores
//!
//! Combines a lexical token-overlap score with semantic vector similarity
//! into one ranked list. When no embedding collaborator is configured, or
//! the collaborator fails, scoring degrades to lexical-only; retrieval
//! never fails a session over embeddings.
//!
//! An empty result is a valid answer meaning "nothing relevant is known";
//! callers fall back to live schema introspection, they do not error.

mod scoring;

use std::sync::Arc;

use queryloom_core::{ContextItem, ScoredItem};
use queryloom_embeddings::EmbeddingProvider;
use queryloom_storage::{KnowledgeStore, LearningStore, StorageError};
use thiserror::Error;

pub use scoring::{cosine_similarity, lexical_overlap, rank, tokenize};

/// Errors surfaced by retrieval. Embedding failures are absorbed, so only
/// storage problems remain.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

/// Relative weight of the lexical score when both scores are available.
const LEXICAL_WEIGHT: f64 = 0.5;

pub struct RetrievalIndex {
    knowledge: Arc<dyn KnowledgeStore>,
    learning: Arc<dyn LearningStore>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    min_relevance: f64,
}

impl RetrievalIndex {
    #[must_use]
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        learning: Arc<dyn LearningStore>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        min_relevance: f64,
    ) -> Self {
        Self { knowledge, learning, embeddings, min_relevance }
    }

    /// Whether semantic scoring is configured.
    #[must_use]
    pub fn has_embeddings(&self) -> bool {
        self.embeddings.is_some()
    }

    /// Ranked search over both stores.
    ///
    /// `table_scope` restricts candidates through the stores' tag index.
    /// `top_k` is a hard cap; items below the relevance floor are dropped.
    /// Ties break by recency, then kind precedence
    /// (`query_pattern > business_rule > table_metadata > learning`),
    /// then id, so results are deterministic for an unchanged store.
    pub async fn search(
        &self,
        query_text: &str,
        table_scope: Option<&[String]>,
        top_k: usize,
    ) -> Result<Vec<ScoredItem>, RetrievalError> {
        let query_vec = self.embed_query(query_text).await;
        let query_tokens = tokenize(query_text);

        let mut candidates: Vec<ContextItem> = Vec::new();
        for item in self.knowledge.list_knowledge(table_scope).await? {
            candidates.push(ContextItem::Knowledge(item));
        }
        for item in self.learning.list_learning(table_scope).await? {
            candidates.push(ContextItem::Learning(item));
        }

        let mut scored: Vec<ScoredItem> = candidates
            .into_iter()
            .map(|item| {
                let lexical = lexical_overlap(&query_tokens, &tokenize(&item.text()));
                let score = match (&query_vec, item.embedding()) {
                    (Some(qv), Some(iv)) => {
                        let semantic = cosine_similarity(qv, iv).max(0.0);
                        LEXICAL_WEIGHT * lexical + (1.0 - LEXICAL_WEIGHT) * semantic
                    },
                    _ => lexical,
                };
                ScoredItem { item, score }
            })
            .filter(|s| s.score >= self.min_relevance)
            .collect();

        rank(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn embed_query(&self, query_text: &str) -> Option<Vec<f32>> {
        match &self.embeddings {
            Some(provider) => match provider.embed(query_text).await {
                Ok(vector) if !vector.is_empty() => Some(vector),
                Ok(_) => {
                    tracing::warn!("embedding collaborator returned an empty vector");
                    None
                },
                Err(e) => {
                    tracing::warn!("query embedding failed, degrading to lexical-only: {}", e);
                    None
                },
            },
            None => None,
        }
    }
}
