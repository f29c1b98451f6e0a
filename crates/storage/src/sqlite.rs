//! SQLite store implementation
//!
//! Single connection behind a mutex; async trait impls delegate here
//! through `spawn_blocking` (see `sqlite_async`). The unique index on
//! `content_hash` is what implements the compare-and-append idempotency
//! contract; the mutex only serializes access to the connection.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use queryloom_core::{ItemKind, KnowledgeInput, KnowledgeItem, LearningInput, LearningItem};
use rusqlite::{Connection, Row, params};

use crate::content_hash::content_hash;
use crate::error::StorageError;
use crate::migrations;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn lock_conn(mutex: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    mutex.lock().map_err(|_| StorageError::LockPoisoned)
}

fn parse_created_at(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)).map_err(|e| {
        StorageError::DataCorruption {
            context: format!("created_at timestamp '{}'", raw),
            source: Box::new(e),
        }
    })
}

fn parse_embedding(raw: Option<String>) -> Result<Option<Vec<f32>>, StorageError> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
}

fn row_to_knowledge(row: &Row<'_>) -> Result<KnowledgeItem, StorageError> {
    let kind_raw: String = row.get(1)?;
    let kind: ItemKind = kind_raw.parse().map_err(|e: String| StorageError::DataCorruption {
        context: format!("item kind '{}'", kind_raw),
        source: e.into(),
    })?;
    let embedding = parse_embedding(row.get(3)?)?;
    let tags_raw: String = row.get(4)?;
    let created_raw: String = row.get(7)?;
    Ok(KnowledgeItem {
        id: row.get(0)?,
        kind,
        text: row.get(2)?,
        embedding,
        tags: serde_json::from_str(&tags_raw)?,
        content_hash: row.get(5)?,
        superseded_by: row.get(6)?,
        created_at: parse_created_at(&created_raw)?,
    })
}

fn row_to_learning(row: &Row<'_>) -> Result<LearningItem, StorageError> {
    let embedding = parse_embedding(row.get(4)?)?;
    let tables_raw: String = row.get(2)?;
    let created_raw: String = row.get(8)?;
    Ok(LearningItem {
        id: row.get(0)?,
        issue: row.get(1)?,
        tables_affected: serde_json::from_str(&tables_raw)?,
        solution: row.get(3)?,
        embedding,
        source_failure_id: row.get(5)?,
        content_hash: row.get(6)?,
        superseded_by: row.get(7)?,
        created_at: parse_created_at(&created_raw)?,
    })
}

const KNOWLEDGE_COLUMNS: &str =
    "id, kind, text, embedding, tags, content_hash, superseded_by, created_at";
const LEARNING_COLUMNS: &str = "id, issue, tables_affected, solution, embedding, \
                                source_failure_id, content_hash, superseded_by, created_at";

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Private in-memory store, used by tests and ephemeral sessions.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        migrations::run_migrations(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn insert_tags(
        conn: &Connection,
        tags: &[String],
        item_id: &str,
        item_kind: &str,
    ) -> Result<(), StorageError> {
        for tag in tags {
            conn.execute(
                "INSERT OR IGNORE INTO item_tags (tag, item_id, item_kind) VALUES (?1, ?2, ?3)",
                params![tag.to_lowercase(), item_id, item_kind],
            )?;
        }
        Ok(())
    }

    // ── Knowledge ───────────────────────────────────────────────────

    pub fn save_knowledge_sync(
        &self,
        input: KnowledgeInput,
    ) -> Result<KnowledgeItem, StorageError> {
        let hash = content_hash(&input.text, &input.tags);
        let conn = lock_conn(&self.conn)?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO knowledge_items \
             (id, kind, text, embedding, tags, content_hash, superseded_by, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
            params![
                uuid::Uuid::new_v4().to_string(),
                input.kind.as_str(),
                input.text,
                input.embedding.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&input.tags)?,
                hash,
                Utc::now().to_rfc3339(),
            ],
        )?;

        // Winner or loser of a racing write, this read returns the row
        // that owns the hash.
        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM knowledge_items WHERE content_hash = ?1",
                    KNOWLEDGE_COLUMNS
                ),
                params![hash],
                |row| Ok(row_to_knowledge(row)),
            )
            .map_err(StorageError::from)??;

        if inserted > 0 {
            Self::insert_tags(&conn, &item.tags, &item.id, "knowledge")?;
        } else {
            tracing::debug!(id = %item.id, "knowledge save deduplicated by content hash");
        }
        Ok(item)
    }

    pub fn get_knowledge_sync(&self, id: &str) -> Result<Option<KnowledgeItem>, StorageError> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM knowledge_items WHERE id = ?1",
            KNOWLEDGE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_knowledge(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_knowledge_sync(
        &self,
        table_scope: Option<&[String]>,
    ) -> Result<Vec<KnowledgeItem>, StorageError> {
        let conn = lock_conn(&self.conn)?;
        let (sql, tags) = scoped_list_query(
            KNOWLEDGE_COLUMNS,
            "knowledge_items",
            "knowledge",
            table_scope,
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(tags.iter()))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(row_to_knowledge(row)?);
        }
        Ok(items)
    }

    pub fn supersede_knowledge_sync(
        &self,
        old_id: &str,
        new_id: &str,
    ) -> Result<(), StorageError> {
        let conn = lock_conn(&self.conn)?;
        supersede(&conn, "knowledge_items", old_id, new_id)
    }

    // ── Learning ────────────────────────────────────────────────────

    pub fn save_learning_sync(&self, input: LearningInput) -> Result<LearningItem, StorageError> {
        let hash = content_hash(
            &format!("{} {}", input.issue, input.solution),
            &input.tables_affected,
        );
        let conn = lock_conn(&self.conn)?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO learning_items \
             (id, issue, tables_affected, solution, embedding, source_failure_id, \
              content_hash, superseded_by, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
            params![
                uuid::Uuid::new_v4().to_string(),
                input.issue,
                serde_json::to_string(&input.tables_affected)?,
                input.solution,
                input.embedding.as_ref().map(serde_json::to_string).transpose()?,
                input.source_failure_id,
                hash,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM learning_items WHERE content_hash = ?1",
                    LEARNING_COLUMNS
                ),
                params![hash],
                |row| Ok(row_to_learning(row)),
            )
            .map_err(StorageError::from)??;

        if inserted > 0 {
            Self::insert_tags(&conn, &item.tables_affected, &item.id, "learning")?;
        } else {
            tracing::debug!(id = %item.id, "learning save deduplicated by content hash");
        }
        Ok(item)
    }

    pub fn get_learning_sync(&self, id: &str) -> Result<Option<LearningItem>, StorageError> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM learning_items WHERE id = ?1", LEARNING_COLUMNS))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_learning(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_learning_sync(
        &self,
        table_scope: Option<&[String]>,
    ) -> Result<Vec<LearningItem>, StorageError> {
        let conn = lock_conn(&self.conn)?;
        let (sql, tags) =
            scoped_list_query(LEARNING_COLUMNS, "learning_items", "learning", table_scope);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(tags.iter()))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(row_to_learning(row)?);
        }
        Ok(items)
    }

    pub fn supersede_learning_sync(&self, old_id: &str, new_id: &str) -> Result<(), StorageError> {
        let conn = lock_conn(&self.conn)?;
        supersede(&conn, "learning_items", old_id, new_id)
    }
}

/// Build a list query, optionally scoped through the tag index.
/// Returns the SQL and the lowercased tag bind values.
fn scoped_list_query(
    columns: &str,
    table: &str,
    item_kind: &str,
    table_scope: Option<&[String]>,
) -> (String, Vec<String>) {
    match table_scope {
        Some(scope) if !scope.is_empty() => {
            let placeholders: Vec<String> =
                (1..=scope.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT DISTINCT i.{columns} FROM {table} i \
                 JOIN item_tags t ON t.item_id = i.id AND t.item_kind = '{item_kind}' \
                 WHERE t.tag IN ({placeholders}) AND i.superseded_by IS NULL \
                 ORDER BY i.created_at DESC, i.id",
                columns = columns.replace(", ", ", i."),
                placeholders = placeholders.join(", "),
            );
            (sql, scope.iter().map(|t| t.to_lowercase()).collect())
        },
        _ => (
            format!(
                "SELECT {columns} FROM {table} WHERE superseded_by IS NULL \
                 ORDER BY created_at DESC, id"
            ),
            Vec::new(),
        ),
    }
}

/// Fill the nullable supersession link on the older row.
/// Append-only contract: a row can be superseded at most once, and the
/// newer row must already exist.
fn supersede(
    conn: &Connection,
    table: &str,
    old_id: &str,
    new_id: &str,
) -> Result<(), StorageError> {
    let new_exists: bool = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", table),
            params![new_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)?;
    if !new_exists {
        return Err(StorageError::NotFound { entity: "superseding item", id: new_id.to_owned() });
    }

    let updated = conn.execute(
        &format!("UPDATE {} SET superseded_by = ?1 WHERE id = ?2 AND superseded_by IS NULL", table),
        params![new_id, old_id],
    )?;
    if updated == 0 {
        let exists: bool = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", table),
                params![old_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;
        if exists {
            return Err(StorageError::InvalidWrite(format!(
                "item {} is already superseded",
                old_id
            )));
        }
        return Err(StorageError::NotFound { entity: "item", id: old_id.to_owned() });
    }
    Ok(())
}
