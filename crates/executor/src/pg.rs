//! PostgreSQL implementation of the executor and introspector traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queryloom_core::{
    ColumnSchema, ErrorClass, ExecutionError, QueryRows, SchemaSnapshot, TableSchema,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};

use crate::classify::classify_sqlx_error;
use crate::{QueryExecutor, SchemaIntrospector};

/// Connection pool: maximum connections.
const POOL_MAX_CONNECTIONS: u32 = 5;
/// Connection pool: acquire timeout in seconds.
const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 10;

pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    /// Connect to the analytics database. The supplied role should be
    /// read-only; the validator blocks writes lexically but the
    /// connection is the backstop.
    pub async fn connect(database_url: &str) -> Result<Self, ExecutionError> {
        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(std::time::Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS))
            .connect(database_url)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Identifiers that are safe to double-quote into introspection SQL.
fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn row_value_to_json(row: &PgRow, index: usize) -> serde_json::Value {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    match type_name {
        "INT2" | "INT4" | "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map_or(serde_json::Value::Null, Into::into),
        "FLOAT4" | "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .and_then(|f| serde_json::Number::from_f64(f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map_or(serde_json::Value::Null, Into::into),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .ok()
            .flatten()
            .map_or(serde_json::Value::Null, |d| d.to_rfc3339().into()),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .ok()
            .flatten()
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map_or(serde_json::Value::Null, Into::into),
    }
}

fn rows_to_query_rows(rows: &[PgRow]) -> QueryRows {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_owned()).collect())
        .unwrap_or_default();
    let data = rows
        .iter()
        .map(|row| (0..row.columns().len()).map(|i| row_value_to_json(row, i)).collect())
        .collect();
    QueryRows { columns, rows: data }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        tracing::debug!(%sql, "executing candidate");
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(classify_sqlx_error)?;
        Ok(rows_to_query_rows(&rows))
    }
}

#[async_trait]
impl SchemaIntrospector for PgExecutor {
    async fn describe(&self, table_name: Option<&str>) -> Result<SchemaSnapshot, ExecutionError> {
        let rows = match table_name {
            Some(name) => sqlx::query(
                "SELECT table_name, column_name, data_type \
                   FROM information_schema.columns \
                  WHERE table_schema = 'public' AND table_name = $1 \
                  ORDER BY table_name, ordinal_position",
            )
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?,
            None => sqlx::query(
                "SELECT table_name, column_name, data_type \
                   FROM information_schema.columns \
                  WHERE table_schema = 'public' \
                  ORDER BY table_name, ordinal_position",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?,
        };

        let mut snapshot = SchemaSnapshot::default();
        for row in &rows {
            let table: String = row.try_get("table_name").map_err(classify_sqlx_error)?;
            let column: String = row.try_get("column_name").map_err(classify_sqlx_error)?;
            let data_type: String = row.try_get("data_type").map_err(classify_sqlx_error)?;

            match snapshot.tables.last_mut() {
                Some(last) if last.name == table => {
                    last.columns.push(ColumnSchema { name: column, declared_type: data_type });
                },
                _ => snapshot.tables.push(TableSchema {
                    name: table,
                    columns: vec![ColumnSchema { name: column, declared_type: data_type }],
                }),
            }
        }

        if let Some(name) = table_name {
            if snapshot.tables.is_empty() {
                return Err(ExecutionError::new(
                    ErrorClass::SchemaMismatch,
                    format!("table '{}' not found", name),
                ));
            }
        }
        Ok(snapshot)
    }

    async fn sample(&self, table_name: &str, n: u32) -> Result<QueryRows, ExecutionError> {
        if !is_safe_identifier(table_name) {
            return Err(ExecutionError::new(
                ErrorClass::Other,
                format!("invalid table identifier '{}'", table_name),
            ));
        }
        let n = n.min(queryloom_core::MAX_SAMPLE_ROWS);
        let sql = format!("SELECT * FROM \"{}\" LIMIT {}", table_name, n);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(classify_sqlx_error)?;
        Ok(rows_to_query_rows(&rows))
    }
}
