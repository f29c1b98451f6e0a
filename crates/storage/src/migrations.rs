//! Embedded store schema

use rusqlite::Connection;

use crate::error::StorageError;

pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_items (
            id            TEXT PRIMARY KEY,
            kind          TEXT NOT NULL,
            text          TEXT NOT NULL,
            embedding     TEXT,
            tags          TEXT NOT NULL,
            content_hash  TEXT NOT NULL UNIQUE,
            superseded_by TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS learning_items (
            id                TEXT PRIMARY KEY,
            issue             TEXT NOT NULL,
            tables_affected   TEXT NOT NULL,
            solution          TEXT NOT NULL,
            embedding         TEXT,
            source_failure_id TEXT,
            content_hash      TEXT NOT NULL UNIQUE,
            superseded_by     TEXT,
            created_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS item_tags (
            tag       TEXT NOT NULL,
            item_id   TEXT NOT NULL,
            item_kind TEXT NOT NULL,
            PRIMARY KEY (tag, item_id)
        );

        CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags (tag);
        CREATE INDEX IF NOT EXISTS idx_knowledge_created ON knowledge_items (created_at);
        CREATE INDEX IF NOT EXISTS idx_learning_created ON learning_items (created_at);
        "#,
    )
    .map_err(|e| StorageError::Migration(e.to_string()))
}
