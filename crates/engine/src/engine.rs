//! The state machine

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use queryloom_core::{
    AttemptExecution, CancelFlag, ContextRef, EngineConfig, ErrorClass, ExecutionError,
    QuerySession, SchemaSnapshot, ScoredItem, SessionStatus, ValidatorResult,
};
use queryloom_embeddings::EmbeddingProvider;
use queryloom_executor::{QueryExecutor, SchemaIntrospector};
use queryloom_llm::{DraftError, DraftRequest, PriorFailure, SqlDrafter};
use queryloom_retrieval::RetrievalIndex;
use queryloom_storage::{KnowledgeStore, LearningStore};
use queryloom_validator::{inject_limit, is_ranking_question, referenced_tables, validate};

use crate::capabilities::Capabilities;
use crate::error::EngineError;

pub struct QueryEngine {
    pub(crate) retrieval: Arc<RetrievalIndex>,
    pub(crate) knowledge: Arc<dyn KnowledgeStore>,
    pub(crate) learning: Arc<dyn LearningStore>,
    pub(crate) drafter: Arc<dyn SqlDrafter>,
    pub(crate) executor: Arc<dyn QueryExecutor>,
    pub(crate) introspector: Option<Arc<dyn SchemaIntrospector>>,
    pub(crate) embeddings: Option<Arc<dyn EmbeddingProvider>>,
    pub(crate) config: EngineConfig,
    capabilities: Capabilities,
    /// Terminal sessions, kept for the explicit persistence operations.
    pub(crate) terminal_sessions: Mutex<HashMap<String, QuerySession>>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct QueryEngineBuilder {
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    learning: Option<Arc<dyn LearningStore>>,
    drafter: Option<Arc<dyn SqlDrafter>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    introspector: Option<Arc<dyn SchemaIntrospector>>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    config: Option<EngineConfig>,
}

impl QueryEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn knowledge(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    #[must_use]
    pub fn learning(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.learning = Some(store);
        self
    }

    #[must_use]
    pub fn drafter(mut self, drafter: Arc<dyn SqlDrafter>) -> Self {
        self.drafter = Some(drafter);
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn introspector(mut self, introspector: Arc<dyn SchemaIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    #[must_use]
    pub fn embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Resolve the capability set and assemble the engine.
    ///
    /// # Errors
    /// `NotConfigured` when a required collaborator (stores, drafter,
    /// executor) is missing.
    pub fn build(self) -> Result<QueryEngine, EngineError> {
        let knowledge = self
            .knowledge
            .ok_or_else(|| EngineError::NotConfigured("knowledge store".to_owned()))?;
        let learning = self
            .learning
            .ok_or_else(|| EngineError::NotConfigured("learning store".to_owned()))?;
        let drafter =
            self.drafter.ok_or_else(|| EngineError::NotConfigured("drafter".to_owned()))?;
        let executor =
            self.executor.ok_or_else(|| EngineError::NotConfigured("executor".to_owned()))?;
        let config = self.config.unwrap_or_default();

        let capabilities =
            Capabilities::resolve(self.embeddings.is_some(), self.introspector.is_some());
        let retrieval = Arc::new(RetrievalIndex::new(
            Arc::clone(&knowledge),
            Arc::clone(&learning),
            self.embeddings.clone(),
            config.min_relevance,
        ));

        Ok(QueryEngine {
            retrieval,
            knowledge,
            learning,
            drafter,
            executor,
            introspector: self.introspector,
            embeddings: self.embeddings,
            config,
            capabilities,
            terminal_sessions: Mutex::new(HashMap::new()),
        })
    }
}

/// Outcome of one execute step, before repair routing.
enum StepOutcome {
    Success,
    Repair(String),
}

impl QueryEngine {
    #[must_use]
    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::new()
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one question→answer transaction to its terminal state.
    ///
    /// Always returns the full session on `Ok`: `Succeeded` with the
    /// result rows reachable via [`QuerySession::result_rows`], or
    /// `FailedExhausted` with the complete attempt trace. No partial or
    /// guessed result is ever reported as success.
    ///
    /// # Errors
    /// `Cancelled` when the caller's flag is raised between state
    /// transitions; infrastructure errors from retrieval storage.
    pub async fn run_session(
        &self,
        question: &str,
        table_scope: &[String],
        cancel: &CancelFlag,
    ) -> Result<QuerySession, EngineError> {
        let mut session = QuerySession::new(
            uuid::Uuid::new_v4().to_string(),
            question.to_owned(),
            table_scope.to_vec(),
        );
        let ranking = is_ranking_question(question);
        let mut repairs: u32 = 0;
        let mut repair_hints: Vec<String> = Vec::new();
        let mut last_failure: Option<String> = None;
        let mut schema_hint: Option<SchemaSnapshot> = None;

        let status = loop {
            // ── SEARCH ─────────────────────────────────────────────
            self.check_cancelled(cancel)?;
            tracing::debug!(session = %session.id, repairs, "state: search");
            let context = self
                .search_step(question, table_scope, &repair_hints, last_failure.as_deref())
                .await?;
            merge_context_refs(&mut session.retrieved_context, &context);

            if context.is_empty() && schema_hint.is_none() {
                schema_hint = self.introspect_all().await;
            }

            // ── DRAFT ──────────────────────────────────────────────
            self.check_cancelled(cancel)?;
            tracing::debug!(session = %session.id, "state: draft");
            let request = DraftRequest {
                question: question.to_owned(),
                context,
                schema_hint: schema_hint.clone(),
                prior_failures: prior_failures(&session),
                default_limit: self.config.default_limit,
            };
            let drafted = match tokio::time::timeout(
                self.config.draft_timeout,
                self.drafter.draft(&request),
            )
            .await
            {
                Ok(Ok(sql)) => sql,
                Ok(Err(DraftError::Unavailable(reason))) => {
                    tracing::warn!(session = %session.id, %reason, "draft unavailable");
                    last_failure = Some(format!("generation unavailable: {reason}"));
                    repairs += 1;
                    if repairs > self.config.retry_bound {
                        break SessionStatus::FailedExhausted;
                    }
                    continue;
                },
                Err(_) => {
                    tracing::warn!(session = %session.id, "draft timed out");
                    last_failure = Some("generation timed out".to_owned());
                    repairs += 1;
                    if repairs > self.config.retry_bound {
                        break SessionStatus::FailedExhausted;
                    }
                    continue;
                },
            };

            // ── VALIDATE ───────────────────────────────────────────
            self.check_cancelled(cancel)?;
            tracing::debug!(session = %session.id, "state: validate");
            let (sql, verdict) = self.validate_step(drafted, table_scope, ranking);
            if verdict.has_blocking() {
                let hint = repair_hint_for(&verdict);
                session.record_attempt(sql.clone(), verdict, None);
                tracing::debug!(session = %session.id, %hint, "blocking violation, repairing");
                last_failure = Some(hint);
                add_hints(&mut repair_hints, referenced_tables(&sql));
                repairs += 1;
                if repairs > self.config.retry_bound {
                    break SessionStatus::FailedExhausted;
                }
                continue;
            }

            // ── EXECUTE ────────────────────────────────────────────
            self.check_cancelled(cancel)?;
            tracing::debug!(session = %session.id, "state: execute");
            let outcome = match tokio::time::timeout(
                self.config.execute_timeout,
                self.executor.execute(&sql),
            )
            .await
            {
                Ok(Ok(rows)) => {
                    let suspicious = rows.is_empty() && ranking;
                    session.record_attempt(
                        sql.clone(),
                        verdict,
                        Some(AttemptExecution::Rows(rows)),
                    );
                    if suspicious {
                        StepOutcome::Repair(
                            "empty result for a ranking question; verify column types and \
                             filters"
                                .to_owned(),
                        )
                    } else {
                        StepOutcome::Success
                    }
                },
                Ok(Err(error)) => {
                    if error.class.is_structural() {
                        schema_hint = self.introspect_all().await.or(schema_hint);
                    }
                    let description = error.to_string();
                    session.record_attempt(
                        sql.clone(),
                        verdict,
                        Some(AttemptExecution::Failed(error)),
                    );
                    StepOutcome::Repair(description)
                },
                Err(_) => {
                    let error = ExecutionError::new(ErrorClass::Timeout, "execution timed out");
                    let description = error.to_string();
                    session.record_attempt(
                        sql.clone(),
                        verdict,
                        Some(AttemptExecution::Failed(error)),
                    );
                    StepOutcome::Repair(description)
                },
            };

            match outcome {
                StepOutcome::Success => break SessionStatus::Succeeded,
                StepOutcome::Repair(description) => {
                    tracing::debug!(session = %session.id, %description, "state: repair");
                    last_failure = Some(description);
                    add_hints(&mut repair_hints, referenced_tables(&sql));
                    repairs += 1;
                    if repairs > self.config.retry_bound {
                        break SessionStatus::FailedExhausted;
                    }
                },
            }
        };

        session.status = status;
        tracing::info!(
            session = %session.id,
            status = ?session.status,
            attempts = session.attempts.len(),
            "session terminal"
        );
        self.archive(session.clone());
        Ok(session)
    }

    fn check_cancelled(&self, cancel: &CancelFlag) -> Result<(), EngineError> {
        if cancel.is_cancelled() { Err(EngineError::Cancelled) } else { Ok(()) }
    }

    /// Retrieval with repair hints folded in: failed table names widen the
    /// query text and narrow the store scope, so the pass surfaces
    /// learning items recorded against those tables.
    async fn search_step(
        &self,
        question: &str,
        table_scope: &[String],
        repair_hints: &[String],
        last_failure: Option<&str>,
    ) -> Result<Vec<ScoredItem>, EngineError> {
        let mut query = question.to_owned();
        if !repair_hints.is_empty() {
            query.push(' ');
            query.push_str(&repair_hints.join(" "));
        }
        if let Some(failure) = last_failure {
            query.push(' ');
            query.push_str(failure);
        }

        let scope: Option<&[String]> = if !repair_hints.is_empty() {
            Some(repair_hints)
        } else if table_scope.is_empty() {
            None
        } else {
            Some(table_scope)
        };

        Ok(self.retrieval.search(&query, scope, self.config.top_k).await?)
    }

    /// Validate, applying the single self-heal: a candidate whose only
    /// finding is a missing LIMIT gets the default bound appended instead
    /// of burning a repair cycle.
    fn validate_step(
        &self,
        sql: String,
        table_scope: &[String],
        ranking: bool,
    ) -> (String, ValidatorResult) {
        use queryloom_core::ViolationKind;

        let verdict = validate(&sql, table_scope, ranking);
        if verdict.only(ViolationKind::MissingLimit) {
            let healed = inject_limit(&sql, self.config.default_limit);
            tracing::debug!("injected default LIMIT {}", self.config.default_limit);
            let verdict = validate(&healed, table_scope, ranking);
            return (healed, verdict);
        }
        (sql, verdict)
    }

    async fn introspect_all(&self) -> Option<SchemaSnapshot> {
        let introspector = self.introspector.as_ref()?;
        match introspector.describe(None).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("schema introspection failed: {}", e);
                None
            },
        }
    }

    fn archive(&self, session: QuerySession) {
        if let Ok(mut sessions) = self.terminal_sessions.lock() {
            sessions.insert(session.id.clone(), session);
        }
    }

    /// A terminal session by id, as archived at its end.
    #[must_use]
    pub fn session(&self, id: &str) -> Option<QuerySession> {
        self.terminal_sessions.lock().ok()?.get(id).cloned()
    }
}

fn merge_context_refs(existing: &mut Vec<ContextRef>, pass: &[ScoredItem]) {
    for scored in pass {
        if !existing.iter().any(|r| r.item_id == scored.item.id()) {
            existing.push(ContextRef { item_id: scored.item.id().to_owned(), score: scored.score });
        }
    }
}

fn prior_failures(session: &QuerySession) -> Vec<PriorFailure> {
    session
        .attempts
        .iter()
        .filter_map(|attempt| {
            let failure = match &attempt.execution_result {
                Some(AttemptExecution::Failed(error)) => error.to_string(),
                Some(AttemptExecution::Rows(rows)) if rows.is_empty() => {
                    "query ran but returned no rows".to_owned()
                },
                Some(AttemptExecution::Rows(_)) => return None,
                None => repair_hint_for(&attempt.validator_result),
            };
            Some(PriorFailure {
                sequence_no: attempt.sequence_no,
                candidate_sql: attempt.candidate_sql.clone(),
                failure,
            })
        })
        .collect()
}

/// Structured repair hint: which checks failed and why.
fn repair_hint_for(verdict: &ValidatorResult) -> String {
    let parts: Vec<String> = verdict
        .violations()
        .iter()
        .filter(|v| v.is_blocking())
        .map(|v| format!("{}: {}", v.kind.as_str(), v.message))
        .collect();
    if parts.is_empty() {
        "validation failed".to_owned()
    } else {
        format!("validator rejected the query ({})", parts.join("; "))
    }
}

fn add_hints(hints: &mut Vec<String>, tables: Vec<String>) {
    for table in tables {
        if !hints.contains(&table) {
            hints.push(table);
        }
    }
}
