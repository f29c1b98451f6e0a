use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use queryloom_core::{
    AttemptExecution, CancelFlag, ColumnSchema, EngineConfig, ErrorClass, ExecutionError,
    LearningInput, QueryRows, SchemaSnapshot, SessionStatus, TableSchema, ValidatorResult,
};
use queryloom_embeddings::{EmbeddingError, EmbeddingProvider};
use queryloom_executor::{QueryExecutor, SchemaIntrospector};
use queryloom_llm::{DraftError, DraftRequest, SqlDrafter};
use queryloom_storage::{LearningStore, SqliteStore};

use crate::{EngineError, QueryEngine};

// ── Scripted collaborators ─────────────────────────────────────────

struct ScriptedDrafter {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<DraftRequest>>,
}

impl ScriptedDrafter {
    fn new(responses: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_owned).map_err(str::to_owned))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<DraftRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlDrafter for ScriptedDrafter {
    async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(sql)) => Ok(sql),
            Some(Err(reason)) => Err(DraftError::Unavailable(reason)),
            None => Err(DraftError::Unavailable("draft script exhausted".to_owned())),
        }
    }
}

enum ExecStep {
    Rows(QueryRows),
    Fail(ExecutionError),
    /// Never completes within the engine's execute timeout.
    Hang,
}

struct ScriptedExecutor {
    steps: Mutex<VecDeque<ExecStep>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(steps: Vec<ExecStep>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps.into()), executed: Mutex::new(Vec::new()) })
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        self.executed.lock().unwrap().push(sql.to_owned());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ExecStep::Rows(rows)) => Ok(rows),
            Some(ExecStep::Fail(error)) => Err(error),
            Some(ExecStep::Hang) => {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                Err(ExecutionError::new(ErrorClass::Other, "unreachable"))
            },
            None => Err(ExecutionError::new(ErrorClass::Other, "execute script exhausted")),
        }
    }
}

struct StaticIntrospector {
    snapshot: SchemaSnapshot,
    calls: AtomicUsize,
}

impl StaticIntrospector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: SchemaSnapshot {
                tables: vec![TableSchema {
                    name: "drivers".to_owned(),
                    columns: vec![
                        ColumnSchema { name: "name".to_owned(), declared_type: "text".to_owned() },
                        ColumnSchema {
                            name: "wins".to_owned(),
                            declared_type: "integer".to_owned(),
                        },
                    ],
                }],
            },
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SchemaIntrospector for StaticIntrospector {
    async fn describe(&self, _table_name: Option<&str>) -> Result<SchemaSnapshot, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.clone())
    }

    async fn sample(&self, _table_name: &str, _n: u32) -> Result<QueryRows, ExecutionError> {
        Ok(QueryRows::default())
    }
}

struct HangingDrafter;

#[async_trait]
impl SqlDrafter for HangingDrafter {
    async fn draft(&self, _request: &DraftRequest) -> Result<String, DraftError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Err(DraftError::Unavailable("unreachable".to_owned()))
    }
}

struct NullEmbedder;

#[async_trait]
impl EmbeddingProvider for NullEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::EmptyResult)
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

fn one_row() -> QueryRows {
    QueryRows {
        columns: vec!["name".to_owned(), "wins".to_owned()],
        rows: vec![vec![serde_json::json!("Hamilton"), serde_json::json!(11)]],
    }
}

struct Harness {
    engine: QueryEngine,
    drafter: Arc<ScriptedDrafter>,
    executor: Arc<ScriptedExecutor>,
    store: SqliteStore,
    introspector: Arc<StaticIntrospector>,
}

fn harness(drafts: Vec<Result<&str, &str>>, execs: Vec<ExecStep>) -> Harness {
    harness_with_config(drafts, execs, EngineConfig::default())
}

fn harness_with_config(
    drafts: Vec<Result<&str, &str>>,
    execs: Vec<ExecStep>,
    config: EngineConfig,
) -> Harness {
    let store = SqliteStore::in_memory().unwrap();
    let drafter = ScriptedDrafter::new(drafts);
    let executor = ScriptedExecutor::new(execs);
    let introspector = StaticIntrospector::new();
    let engine = QueryEngine::builder()
        .knowledge(Arc::new(store.clone()))
        .learning(Arc::new(store.clone()))
        .drafter(Arc::clone(&drafter) as Arc<dyn SqlDrafter>)
        .executor(Arc::clone(&executor) as Arc<dyn QueryExecutor>)
        .introspector(Arc::clone(&introspector) as Arc<dyn SchemaIntrospector>)
        .config(config)
        .build()
        .unwrap();
    Harness { engine, drafter, executor, store, introspector }
}

fn scope(tables: &[&str]) -> Vec<String> {
    tables.iter().map(|t| (*t).to_string()).collect()
}

const GOOD_RANKED_SQL: &str =
    "SELECT name, wins FROM drivers ORDER BY wins DESC LIMIT 1";

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_succeeds_in_one_attempt() {
    let h = harness(vec![Ok(GOOD_RANKED_SQL)], vec![ExecStep::Rows(one_row())]);
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.attempts.len(), 1);
    assert_eq!(session.attempts[0].sequence_no, 1);
    assert!(matches!(session.attempts[0].validator_result, ValidatorResult::Pass));
    assert_eq!(session.result_rows().unwrap().len(), 1);
    // Terminal session is archived for persistence calls
    assert!(h.engine.session(&session.id).is_some());
}

#[tokio::test]
async fn missing_limit_is_self_healed_without_a_repair_cycle() {
    let h = harness(
        vec![Ok("SELECT name FROM drivers")],
        vec![ExecStep::Rows(one_row())],
    );
    let session = h
        .engine
        .run_session("list driver names", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.attempts.len(), 1);
    let executed = h.executor.executed();
    assert_eq!(executed, vec!["SELECT name FROM drivers LIMIT 50".to_string()]);
    assert!(matches!(session.attempts[0].validator_result, ValidatorResult::Pass));
}

#[tokio::test]
async fn wildcard_projection_blocks_before_execution() {
    // Scenario B: SELECT * never reaches the executor
    let h = harness(
        vec![Ok("SELECT * FROM drivers"), Ok("SELECT name FROM drivers LIMIT 5")],
        vec![ExecStep::Rows(one_row())],
    );
    let session = h
        .engine
        .run_session("list driver names", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.attempts.len(), 2);
    // Blocked attempt was recorded without an execution result
    assert!(session.attempts[0].execution_result.is_none());
    assert!(session.attempts[0].validator_result.has_blocking());
    // Only the repaired candidate was executed
    assert_eq!(h.executor.executed().len(), 1);

    // The repair draft saw a structured hint naming the failed check
    let requests = h.drafter.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prior_failures[0].failure.contains("wildcard_projection"));
}

#[tokio::test]
async fn empty_retrieval_falls_back_to_schema_introspection() {
    // Scenario C: nothing in the stores → the drafter gets a live snapshot
    let h = harness(vec![Ok(GOOD_RANKED_SQL)], vec![ExecStep::Rows(one_row())]);
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert!(h.introspector.calls.load(Ordering::SeqCst) >= 1);
    let requests = h.drafter.requests();
    assert!(requests[0].context.is_empty());
    let hint = requests[0].schema_hint.as_ref().unwrap();
    assert_eq!(hint.tables[0].name, "drivers");
}

#[tokio::test]
async fn type_mismatch_repair_retrieves_the_matching_learning_item() {
    // Scenario A: a TEXT date column breaks the first draft; the learning
    // store knows the fix and the second draft applies it.
    let h = harness(
        vec![
            Ok("SELECT name, wins FROM drivers JOIN races ON races.year = 2019 \
                ORDER BY wins DESC LIMIT 1"),
            Ok("SELECT name, wins FROM drivers JOIN races \
                ON races.driver_id = drivers.id \
                WHERE TO_DATE(races.date, 'DD Mon YYYY') >= DATE '2019-01-01' \
                ORDER BY wins DESC LIMIT 1"),
        ],
        vec![
            ExecStep::Fail(ExecutionError::new(
                ErrorClass::TypeMismatch,
                "operator does not exist: text = integer",
            )),
            ExecStep::Rows(one_row()),
        ],
    );
    h.store
        .save_learning(LearningInput {
            issue: "races date column is TEXT; comparisons fail with operator does not exist"
                .to_owned(),
            tables_affected: vec!["races".to_owned()],
            solution: "cast with TO_DATE(date, 'DD Mon YYYY') before comparing".to_owned(),
            embedding: None,
            source_failure_id: None,
        })
        .await
        .unwrap();

    let session = h
        .engine
        .run_session(
            "top driver by wins in 2019",
            &scope(&["drivers", "races"]),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.attempts.len(), 2);
    match &session.attempts[0].execution_result {
        Some(AttemptExecution::Failed(error)) => {
            assert_eq!(error.class, ErrorClass::TypeMismatch);
        },
        other => panic!("expected failed first attempt, got {:?}", other),
    }

    // The repair pass surfaced the learning item to the drafter
    let requests = h.drafter.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests[1].context.iter().any(|s| s.item.text().contains("TO_DATE")),
        "repair draft should see the learning item"
    );
    assert!(!requests[1].prior_failures.is_empty());
}

#[tokio::test]
async fn consecutive_timeouts_exhaust_with_exactly_four_attempts() {
    // Scenario D: retry_bound 3 → initial + 3 repairs, all timed out
    let config = EngineConfig {
        execute_timeout: std::time::Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let h = harness_with_config(
        vec![Ok(GOOD_RANKED_SQL); 4],
        vec![ExecStep::Hang, ExecStep::Hang, ExecStep::Hang, ExecStep::Hang],
        config,
    );
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::FailedExhausted);
    assert_eq!(session.attempts.len(), 4);
    for (i, attempt) in session.attempts.iter().enumerate() {
        assert_eq!(attempt.sequence_no, i as u32 + 1);
        match &attempt.execution_result {
            Some(AttemptExecution::Failed(error)) => assert_eq!(error.class, ErrorClass::Timeout),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }
    assert!(session.result_rows().is_none());
}

#[tokio::test]
async fn attempt_count_never_exceeds_retry_bound_plus_one() {
    let h = harness(
        vec![Ok(GOOD_RANKED_SQL); 8],
        vec![
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
        ],
    );
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    let bound = h.engine.config().retry_bound as usize;
    assert_eq!(session.status, SessionStatus::FailedExhausted);
    assert!(session.attempts.len() <= bound + 1);
}

#[tokio::test]
async fn generation_unavailable_consumes_the_retry_budget() {
    let h = harness(
        vec![Err("model overloaded"); 4],
        vec![],
    );
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::FailedExhausted);
    assert!(session.attempts.is_empty());
    assert!(h.executor.executed().is_empty());
}

#[tokio::test]
async fn draft_timeout_is_a_structural_failure_not_a_fatal_error() {
    let store = SqliteStore::in_memory().unwrap();
    let executor = ScriptedExecutor::new(vec![]);
    let engine = QueryEngine::builder()
        .knowledge(Arc::new(store.clone()))
        .learning(Arc::new(store))
        .drafter(Arc::new(HangingDrafter) as Arc<dyn SqlDrafter>)
        .executor(Arc::clone(&executor) as Arc<dyn QueryExecutor>)
        .config(EngineConfig {
            draft_timeout: std::time::Duration::from_millis(50),
            ..EngineConfig::default()
        })
        .build()
        .unwrap();

    let session = engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::FailedExhausted);
    assert!(session.attempts.is_empty());
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn ranking_question_with_empty_rows_triggers_one_repair() {
    let h = harness(
        vec![Ok(GOOD_RANKED_SQL), Ok(GOOD_RANKED_SQL)],
        vec![
            ExecStep::Rows(QueryRows::default()),
            ExecStep::Rows(one_row()),
        ],
    );
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.attempts.len(), 2);
    match &session.attempts[0].execution_result {
        Some(AttemptExecution::Rows(rows)) => assert!(rows.is_empty()),
        other => panic!("expected recorded empty rows, got {:?}", other),
    }
}

#[tokio::test]
async fn non_ranking_empty_result_is_a_legitimate_success() {
    let h = harness(
        vec![Ok("SELECT name FROM drivers WHERE name = 'nobody' LIMIT 5")],
        vec![ExecStep::Rows(QueryRows::default())],
    );
    let session = h
        .engine
        .run_session("list drivers named nobody", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Succeeded);
    assert_eq!(session.attempts.len(), 1);
}

#[tokio::test]
async fn cancellation_is_observed_before_any_attempt_is_recorded() {
    let h = harness(vec![Ok(GOOD_RANKED_SQL)], vec![ExecStep::Rows(one_row())]);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(h.drafter.requests().is_empty());
    assert!(h.executor.executed().is_empty());
}

#[tokio::test]
async fn save_pattern_requires_a_succeeded_session_and_is_idempotent() {
    let h = harness(vec![Ok(GOOD_RANKED_SQL)], vec![ExecStep::Rows(one_row())]);
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();

    let first = h.engine.save_pattern(&session.id, Some("validated by analyst")).await.unwrap();
    let second = h.engine.save_pattern(&session.id, Some("validated by analyst")).await.unwrap();
    assert_eq!(first, second);

    let saved = h.store.get_knowledge_sync(&first).unwrap().unwrap();
    assert!(saved.text.contains(GOOD_RANKED_SQL));
    assert_eq!(saved.tags, vec!["drivers".to_string()]);
}

#[tokio::test]
async fn save_pattern_rejects_exhausted_and_unknown_sessions() {
    let h = harness(
        vec![Ok(GOOD_RANKED_SQL); 4],
        vec![
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::Other, "boom")),
        ],
    );
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::FailedExhausted);

    let err = h.engine.save_pattern(&session.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let err = h.engine.save_pattern("no-such-session", None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn save_learning_is_idempotent_and_allowed_after_exhaustion() {
    let h = harness(
        vec![Ok(GOOD_RANKED_SQL); 4],
        vec![
            ExecStep::Fail(ExecutionError::new(ErrorClass::TypeMismatch, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::TypeMismatch, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::TypeMismatch, "boom")),
            ExecStep::Fail(ExecutionError::new(ErrorClass::TypeMismatch, "boom")),
        ],
    );
    let session = h
        .engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::FailedExhausted);

    let tables = vec!["races".to_string()];
    let first = h
        .engine
        .save_learning("date column is TEXT", &tables, "cast with TO_DATE", None)
        .await
        .unwrap();
    let second = h
        .engine
        .save_learning("date column is TEXT", &tables, "cast with TO_DATE", None)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn embedding_failures_never_fail_persistence() {
    let store = SqliteStore::in_memory().unwrap();
    let drafter = ScriptedDrafter::new(vec![Ok(GOOD_RANKED_SQL)]);
    let executor = ScriptedExecutor::new(vec![ExecStep::Rows(one_row())]);
    let engine = QueryEngine::builder()
        .knowledge(Arc::new(store.clone()))
        .learning(Arc::new(store))
        .drafter(drafter as Arc<dyn SqlDrafter>)
        .executor(executor as Arc<dyn QueryExecutor>)
        .embeddings(Arc::new(NullEmbedder) as Arc<dyn EmbeddingProvider>)
        .build()
        .unwrap();

    let session = engine
        .run_session("top driver by wins in 2019", &scope(&["drivers"]), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Succeeded);
    let id = engine.save_pattern(&session.id, None).await.unwrap();
    assert!(!id.is_empty());
}

#[tokio::test]
async fn builder_rejects_missing_required_collaborators() {
    let err = QueryEngine::builder().build().unwrap_err();
    assert!(matches!(err, EngineError::NotConfigured(_)));
}

#[tokio::test]
async fn capabilities_reflect_wiring() {
    let h = harness(vec![], vec![]);
    assert!(h.engine.capabilities().introspection);
    assert!(!h.engine.capabilities().semantic_search);
}
