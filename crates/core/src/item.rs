//! Knowledge and learning item types
//!
//! `KnowledgeItem` is the curated side of the context base: table
//! metadata, business rules, and validated query patterns. `LearningItem`
//! is the runtime-discovered side: corrections generalized from repair
//! cycles. Both are append-only; supersession is a link, never a mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a curated knowledge entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Schema, columns, and types for one table
    TableMetadata,
    /// Business definition or annotation (metric definitions, caveats)
    BusinessRule,
    /// Previously validated full SQL query with its question
    QueryPattern,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TableMetadata => "table_metadata",
            Self::BusinessRule => "business_rule",
            Self::QueryPattern => "query_pattern",
        }
    }

    /// Retrieval tie-break precedence; higher ranks first.
    ///
    /// A validated full query pattern is more directly reusable than a
    /// business definition, which in turn beats raw table metadata.
    /// Learning items rank below all curated kinds (see
    /// [`ContextItem::kind_rank`]).
    pub fn rank(&self) -> u8 {
        match self {
            Self::QueryPattern => 3,
            Self::BusinessRule => 2,
            Self::TableMetadata => 1,
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table_metadata" => Ok(Self::TableMetadata),
            "business_rule" => Ok(Self::BusinessRule),
            "query_pattern" => Ok(Self::QueryPattern),
            other => Err(format!("unknown item kind: {}", other)),
        }
    }
}

/// Curated knowledge entry
///
/// Immutable once written. A newer entry that replaces this one is
/// recorded by filling `superseded_by`; the old row is retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique identifier
    pub id: String,
    /// Kind of entry
    pub kind: ItemKind,
    /// Human-readable description or SQL
    pub text: String,
    /// Embedding vector, absent when the embedding collaborator was unavailable
    pub embedding: Option<Vec<f32>>,
    /// Table names this entry is about
    pub tags: Vec<String>,
    /// Content hash used for idempotent writes
    pub content_hash: String,
    /// Id of the newer item that supersedes this one, if any
    pub superseded_by: Option<String>,
    /// When this entry was created
    pub created_at: DateTime<Utc>,
}

/// Input for writing a new knowledge entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeInput {
    pub kind: ItemKind,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub tags: Vec<String>,
}

/// Runtime-discovered correction
///
/// Append-only. `source_failure_id` is a non-owning back-reference to the
/// attempt that surfaced the issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningItem {
    /// Unique identifier
    pub id: String,
    /// Short description of the issue
    pub issue: String,
    /// Tables this correction applies to
    pub tables_affected: Vec<String>,
    /// Free text or SQL fragment that fixes the issue
    pub solution: String,
    /// Embedding vector, absent when the embedding collaborator was unavailable
    pub embedding: Option<Vec<f32>>,
    /// Back-reference to the failure this was generalized from
    pub source_failure_id: Option<String>,
    /// Content hash used for idempotent writes
    pub content_hash: String,
    /// Id of the newer item that supersedes this one, if any
    pub superseded_by: Option<String>,
    /// When this entry was created
    pub created_at: DateTime<Utc>,
}

/// Input for writing a new learning entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInput {
    pub issue: String,
    pub tables_affected: Vec<String>,
    pub solution: String,
    pub embedding: Option<Vec<f32>>,
    pub source_failure_id: Option<String>,
}

/// An item from either store, as returned by retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "store", rename_all = "snake_case")]
pub enum ContextItem {
    Knowledge(KnowledgeItem),
    Learning(LearningItem),
}

impl ContextItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Knowledge(k) => &k.id,
            Self::Learning(l) => &l.id,
        }
    }

    /// Searchable text of the item.
    pub fn text(&self) -> String {
        match self {
            Self::Knowledge(k) => k.text.clone(),
            Self::Learning(l) => format!("{} {}", l.issue, l.solution),
        }
    }

    /// Table names the item is tagged with.
    pub fn tables(&self) -> &[String] {
        match self {
            Self::Knowledge(k) => &k.tags,
            Self::Learning(l) => &l.tables_affected,
        }
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        match self {
            Self::Knowledge(k) => k.embedding.as_deref(),
            Self::Learning(l) => l.embedding.as_deref(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Knowledge(k) => k.created_at,
            Self::Learning(l) => l.created_at,
        }
    }

    /// Tie-break precedence: `query_pattern > business_rule > table_metadata > learning`.
    pub fn kind_rank(&self) -> u8 {
        match self {
            Self::Knowledge(k) => k.kind.rank(),
            Self::Learning(_) => 0,
        }
    }
}

/// A retrieval hit: item plus combined relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: ContextItem,
    pub score: f64,
}

/// Lightweight reference to a retrieved item, recorded on the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRef {
    pub item_id: String,
    pub score: f64,
}
