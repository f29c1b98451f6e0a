//! Query session and attempt trace types
//!
//! A `QuerySession` is one question→answer transaction. The orchestrator
//! only ever appends `Attempt`s; past attempts are never edited, so the
//! trace stays truthful for debugging and for generalizing learning items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionError, QueryRows};
use crate::item::ContextRef;
use crate::violation::ValidatorResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Succeeded,
    FailedExhausted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed_exhausted" => Ok(Self::FailedExhausted),
            other => Err(format!("invalid session status: {}", other)),
        }
    }
}

/// Outcome of the execute step for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttemptExecution {
    Rows(QueryRows),
    Failed(ExecutionError),
}

/// One generate→validate→execute pass, recorded atomically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based position in the session; strictly increasing
    pub sequence_no: u32,
    pub candidate_sql: String,
    pub validator_result: ValidatorResult,
    /// Absent when a blocking violation (or unavailable drafter) prevented execution
    pub execution_result: Option<AttemptExecution>,
    pub timestamp: DateTime<Utc>,
}

/// One question→answer transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySession {
    pub id: String,
    pub question: String,
    /// Tables the session is permitted to touch
    pub table_scope: Vec<String>,
    /// Most relevant first
    pub retrieved_context: Vec<ContextRef>,
    pub attempts: Vec<Attempt>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

impl QuerySession {
    pub fn new(id: String, question: String, table_scope: Vec<String>) -> Self {
        Self {
            id,
            question,
            table_scope,
            retrieved_context: Vec::new(),
            attempts: Vec::new(),
            status: SessionStatus::Pending,
            started_at: Utc::now(),
        }
    }

    /// Append the next attempt. Sequence numbers are assigned here so a
    /// recorded attempt can never break monotonicity.
    pub fn record_attempt(
        &mut self,
        candidate_sql: String,
        validator_result: ValidatorResult,
        execution_result: Option<AttemptExecution>,
    ) -> u32 {
        let sequence_no = self.attempts.len() as u32 + 1;
        self.attempts.push(Attempt {
            sequence_no,
            candidate_sql,
            validator_result,
            execution_result,
            timestamp: Utc::now(),
        });
        sequence_no
    }

    /// The successful row set, if the session succeeded.
    pub fn result_rows(&self) -> Option<&QueryRows> {
        if self.status != SessionStatus::Succeeded {
            return None;
        }
        self.attempts.iter().rev().find_map(|a| match &a.execution_result {
            Some(AttemptExecution::Rows(rows)) => Some(rows),
            _ => None,
        })
    }

    /// Table names mentioned by failed attempts, for repair-scoped retrieval.
    pub fn failed_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for attempt in &self.attempts {
            if matches!(attempt.execution_result, Some(AttemptExecution::Failed(_)) | None) {
                let lowered = attempt.candidate_sql.to_lowercase();
                for table in &self.table_scope {
                    if lowered.contains(&table.to_lowercase()) && !tables.contains(table) {
                        tables.push(table.clone());
                    }
                }
            }
        }
        tables
    }
}
