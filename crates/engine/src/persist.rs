//! Explicit persistence operations
//!
//! Persistence is never performed by the state machine itself: a correct
//! answer may still be coincidentally correct, so writing it back is a
//! separate, caller-invoked decision. Both writes are idempotent through
//! the stores' content-hash compare-and-append.

use queryloom_core::{ItemKind, KnowledgeInput, LearningInput, SessionStatus};
use queryloom_validator::referenced_tables;

use crate::engine::QueryEngine;
use crate::error::EngineError;

impl QueryEngine {
    /// Save the validated query of a succeeded session as a reusable
    /// pattern. Returns the pattern's id; saving the same session twice
    /// returns the same id.
    ///
    /// # Errors
    /// `InvalidState` when the session is unknown or did not succeed.
    pub async fn save_pattern(
        &self,
        session_id: &str,
        notes: Option<&str>,
    ) -> Result<String, EngineError> {
        let session = self.session(session_id).ok_or_else(|| {
            EngineError::InvalidState(format!("unknown session {}", session_id))
        })?;
        if session.status != SessionStatus::Succeeded {
            return Err(EngineError::InvalidState(format!(
                "session {} is {:?}, not succeeded",
                session_id, session.status
            )));
        }

        // The final attempt is the one that produced rows.
        let sql = session
            .attempts
            .last()
            .map(|a| a.candidate_sql.clone())
            .ok_or_else(|| {
                EngineError::InvalidState(format!("session {} has no attempts", session_id))
            })?;
        let tables = referenced_tables(&sql);

        let mut text = format!("Q: {}\nSQL: {}", session.question, sql);
        if let Some(notes) = notes {
            text.push_str("\nNotes: ");
            text.push_str(notes);
        }
        let embedding = self.embed_for_save(&text).await;

        let item = self
            .knowledge
            .save_knowledge(KnowledgeInput {
                kind: ItemKind::QueryPattern,
                text,
                embedding,
                tags: tables,
            })
            .await?;
        tracing::info!(id = %item.id, session = %session_id, "validated pattern saved");
        Ok(item.id)
    }

    /// Save a generalized fix discovered during repair. Callable for any
    /// session that went through repair, including exhausted ones; a
    /// documented inability is itself useful.
    ///
    /// # Errors
    /// Storage failures only; idempotent under content hash.
    pub async fn save_learning(
        &self,
        issue: &str,
        tables_affected: &[String],
        solution: &str,
        source_failure_id: Option<&str>,
    ) -> Result<String, EngineError> {
        let embedding = self.embed_for_save(&format!("{} {}", issue, solution)).await;
        let item = self
            .learning
            .save_learning(LearningInput {
                issue: issue.to_owned(),
                tables_affected: tables_affected.to_vec(),
                solution: solution.to_owned(),
                embedding,
                source_failure_id: source_failure_id.map(str::to_owned),
            })
            .await?;
        tracing::info!(id = %item.id, "learning item saved");
        Ok(item.id)
    }

    /// Link a sharper learning item over an older one. The old row is
    /// retained for audit; it just stops surfacing in retrieval.
    ///
    /// # Errors
    /// Storage failures; `InvalidWrite` when the old item is already
    /// superseded.
    pub async fn supersede_learning(&self, old_id: &str, new_id: &str) -> Result<(), EngineError> {
        Ok(self.learning.supersede_learning(old_id, new_id).await?)
    }

    /// Best-effort embedding for persisted text; absence of the embedding
    /// collaborator degrades the item to lexical-only retrieval.
    async fn embed_for_save(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.embeddings.as_ref()?;
        match provider.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!("embedding for save failed, storing without vector: {}", e);
                None
            },
        }
    }
}
