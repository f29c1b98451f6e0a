//! Knowledge and learning stores
//!
//! Both stores are append-mostly mappings from item id to item record,
//! with a secondary tag index for table-scoped lookups. Writes are
//! idempotent under a content hash of (normalized text + table set):
//! a repeated save of semantically identical content returns the existing
//! id instead of creating a duplicate, and two racing writers resolve to
//! the first winner's id.

mod content_hash;
mod error;
mod migrations;
mod sqlite;
mod sqlite_async;
mod traits;

pub use content_hash::content_hash;
pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::{KnowledgeStore, LearningStore};
