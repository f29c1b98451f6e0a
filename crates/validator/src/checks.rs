//! The safety checks, in their fixed evaluation order

use std::sync::LazyLock;

use queryloom_core::{ValidatorResult, Violation, ViolationKind};
use regex::Regex;

use crate::tables::referenced_tables;

static DESTRUCTIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|truncate|create|grant|revoke)\b").unwrap()
});

static SELECT_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with)\b").unwrap());

static LIMIT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\blimit\s+\d+\b").unwrap());

static SELECT_STAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bselect\s+(distinct\s+)?([a-zA-Z_][a-zA-Z0-9_]*\.)?\*").unwrap());

static ORDER_BY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\border\s+by\b").unwrap());

fn clean_sql(sql: &str) -> String {
    let collapsed: Vec<&str> = sql.split_whitespace().collect();
    collapsed.join(" ")
}

/// Validate a candidate query against the read-only, explicit-column,
/// bounded-result policy.
///
/// `table_scope` is the set of tables the session may touch; an empty
/// scope means unrestricted (no scope was configured for the session).
/// `ranking_question` comes from [`crate::is_ranking_question`] on the
/// originating question.
///
/// Checks run in a fixed order and all classes are evaluated, so the
/// result lists every finding of one pass. Deterministic; never executes
/// the query.
pub fn validate(sql: &str, table_scope: &[String], ranking_question: bool) -> ValidatorResult {
    let mut violations = Vec::new();
    let cleaned = clean_sql(sql);

    // 1. Statement kind: single read-only SELECT (or CTE chain) only.
    if cleaned.is_empty() {
        violations.push(Violation::blocking(ViolationKind::NonReadOnly, "SQL is empty"));
        return ValidatorResult::from_violations(violations);
    }
    let destructive: Vec<String> = {
        let mut hits: Vec<String> = DESTRUCTIVE_REGEX
            .captures_iter(&cleaned)
            .map(|c| c[1].to_lowercase())
            .collect();
        hits.sort();
        hits.dedup();
        hits
    };
    if !destructive.is_empty() {
        violations.push(Violation::blocking(
            ViolationKind::NonReadOnly,
            format!("destructive or write operations detected: {}", destructive.join(", ")),
        ));
    } else if !SELECT_START_REGEX.is_match(&cleaned) {
        violations.push(Violation::blocking(
            ViolationKind::NonReadOnly,
            "only a single SELECT statement is permitted",
        ));
    }
    if cleaned.trim_end_matches(';').contains(';') {
        violations.push(Violation::blocking(
            ViolationKind::NonReadOnly,
            "multiple SQL statements detected; a single statement is required",
        ));
    }

    // 2. Column projection: explicit column lists required.
    if SELECT_STAR_REGEX.is_match(&cleaned) {
        violations.push(Violation::blocking(
            ViolationKind::WildcardProjection,
            "SELECT * is not allowed; specify explicit columns",
        ));
    }

    // 3. Result bound.
    if !LIMIT_REGEX.is_match(&cleaned) {
        violations
            .push(Violation::warning(ViolationKind::MissingLimit, "missing LIMIT clause"));
    }

    // 4. Ordering for ranked answers.
    if ranking_question && !ORDER_BY_REGEX.is_match(&cleaned) {
        violations.push(Violation::warning(
            ViolationKind::MissingOrder,
            "ranking question without ORDER BY; results are arbitrary",
        ));
    }

    // 5. Table scope.
    if !table_scope.is_empty() {
        let scope: Vec<String> = table_scope.iter().map(|t| t.to_lowercase()).collect();
        for table in referenced_tables(&cleaned) {
            if !scope.contains(&table) {
                violations.push(Violation::blocking(
                    ViolationKind::OutOfScopeTable,
                    format!("table '{}' is outside the session's permitted scope", table),
                ));
            }
        }
    }

    ValidatorResult::from_violations(violations)
}

/// Append a `LIMIT` clause to a query that lacks one.
///
/// The orchestrator's single self-heal: when `missing_limit` is the only
/// violation, the bound is injected instead of burning a repair cycle.
pub fn inject_limit(sql: &str, limit: u32) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    format!("{} LIMIT {}", trimmed, limit)
}
