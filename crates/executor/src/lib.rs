//! Execution collaborator and live schema introspector
//!
//! The engine executes candidate SQL and reads live schema only through
//! these traits. The PostgreSQL implementation classifies failures by
//! SQLSTATE so the orchestrator's repair routing can distinguish schema
//! problems from transient ones.

mod classify;
mod pg;

use async_trait::async_trait;
use queryloom_core::{ExecutionError, QueryRows, SchemaSnapshot};

pub use classify::classify_sqlstate;
pub use pg::PgExecutor;

/// External execution collaborator. Implementations must hold a
/// read-only connection; the safety validator is the policy layer, this
/// is the enforcement backstop.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError>;
}

/// On-demand live schema reader. Advisory input for drafting, never
/// authoritative over the knowledge store.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Snapshot of one table, or of every visible table when `None`.
    async fn describe(&self, table_name: Option<&str>) -> Result<SchemaSnapshot, ExecutionError>;

    /// A few example rows, for eyeballing formats during repair.
    async fn sample(&self, table_name: &str, n: u32) -> Result<QueryRows, ExecutionError>;
}
