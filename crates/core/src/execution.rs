//! Execution collaborator result types
//!
//! The engine's repair routing depends on the error class reported by the
//! execution collaborator, so the classification lives in core where both
//! the executor and the engine can reach it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row set returned by a successful execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Failure class reported by the execution collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Unknown table or column
    SchemaMismatch,
    /// Type comparison or cast failure
    TypeMismatch,
    /// Statement or connection timed out
    Timeout,
    /// Read-only role rejected the statement
    PermissionDenied,
    Other,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaMismatch => "schema_mismatch",
            Self::TypeMismatch => "type_mismatch",
            Self::Timeout => "timeout",
            Self::PermissionDenied => "permission_denied",
            Self::Other => "other",
        }
    }

    /// Whether this failure suggests the schema assumptions were wrong
    /// and the next retrieval pass should consult live schema.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::SchemaMismatch | Self::TypeMismatch)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified execution failure
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("execution failed ({class}): {message}")]
pub struct ExecutionError {
    pub class: ErrorClass,
    pub message: String,
}

impl ExecutionError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self { class, message: message.into() }
    }
}

/// Schema snapshot from the live introspector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub declared_type: String,
}
