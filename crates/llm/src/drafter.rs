//! The `SqlDrafter` contract and its chat-backed implementation

use async_trait::async_trait;
use queryloom_core::{ScoredItem, SchemaSnapshot};

use crate::client::LlmClient;
use crate::error::DraftError;

/// Everything the drafting collaborator may consider for one candidate.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub question: String,
    /// Retrieved context, most relevant first
    pub context: Vec<ScoredItem>,
    /// Live schema, present when retrieval came back empty or a repair
    /// hinted at a schema mismatch
    pub schema_hint: Option<SchemaSnapshot>,
    /// Failures from earlier attempts in this session, oldest first
    pub prior_failures: Vec<PriorFailure>,
    /// LIMIT value the caller expects by default
    pub default_limit: u32,
}

/// One earlier failed attempt, summarized for the model.
#[derive(Debug, Clone)]
pub struct PriorFailure {
    pub sequence_no: u32,
    pub candidate_sql: String,
    pub failure: String,
}

/// External candidate-generation collaborator.
#[async_trait]
pub trait SqlDrafter: Send + Sync {
    /// Produce candidate SQL for the request.
    ///
    /// # Errors
    /// `DraftError::Unavailable` when no candidate could be produced; the
    /// orchestrator absorbs this into the repair loop.
    async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError>;
}

const SYSTEM_PROMPT: &str = "\
You are a SQL drafting assistant for a read-only analytics database.
Rules:
- Produce exactly one SELECT statement (CTE chains are fine), nothing else.
- Never use SELECT *; list columns explicitly.
- Include a LIMIT clause.
- Include ORDER BY when the question asks for a top/most/highest answer.
- Apply every data-quality note from the provided context; they describe
  real type and format problems in these tables.
- Answer with the SQL only, in a ```sql fence.";

fn render_request(request: &DraftRequest) -> String {
    let mut sections = Vec::new();
    sections.push(format!("Question: {}", request.question));

    if !request.context.is_empty() {
        let mut block = String::from("Context (most relevant first):\n");
        for scored in &request.context {
            let tables = scored.item.tables().join(", ");
            block.push_str(&format!("- [{}] {}\n", tables, scored.item.text()));
        }
        sections.push(block);
    }

    if let Some(schema) = &request.schema_hint {
        let mut block = String::from("Live schema:\n");
        for table in &schema.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.declared_type))
                .collect();
            block.push_str(&format!("- {} ({})\n", table.name, columns.join(", ")));
        }
        sections.push(block);
    }

    if !request.prior_failures.is_empty() {
        let mut block =
            String::from("Earlier attempts failed; do not repeat these mistakes:\n");
        for failure in &request.prior_failures {
            block.push_str(&format!(
                "- attempt {}: {}\n  failed with: {}\n",
                failure.sequence_no, failure.candidate_sql, failure.failure
            ));
        }
        sections.push(block);
    }

    sections.push(format!("Default LIMIT: {}", request.default_limit));
    sections.join("\n\n")
}

/// Pull SQL out of a model reply: prefer a ```sql fence, fall back to any
/// fence, then to the raw trimmed text.
fn extract_sql(reply: &str) -> String {
    for marker in ["```sql", "```"] {
        if let Some(start) = reply.find(marker) {
            let after = &reply[start + marker.len()..];
            if let Some(end) = after.find("```") {
                return after[..end].trim().to_owned();
            }
        }
    }
    reply.trim().to_owned()
}

/// Chat-completion-backed drafter.
pub struct LlmDrafter {
    client: LlmClient,
}

impl LlmDrafter {
    #[must_use]
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SqlDrafter for LlmDrafter {
    async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError> {
        let user = render_request(request);
        let reply = self.client.chat_completion(SYSTEM_PROMPT, &user).await?;
        let sql = extract_sql(&reply);
        if sql.is_empty() {
            return Err(DraftError::Unavailable("model returned no SQL".to_owned()));
        }
        tracing::debug!(sql = %sql, "drafted candidate");
        Ok(sql)
    }
}
