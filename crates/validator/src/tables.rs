//! Referenced-table extraction
//!
//! Finds the table identifiers a query touches (`FROM` / `JOIN` targets)
//! so scope checks can compare them against the session's permitted set.
//! CTE names introduced by `WITH x AS (...)` are not tables and are
//! excluded.

use std::sync::LazyLock;

use regex::Regex;

static FROM_JOIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+("?[a-zA-Z_][a-zA-Z0-9_.]*"?)"#).unwrap()
});

static CTE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bwith\s+(?:recursive\s+)?|,\s*)([a-zA-Z_][a-zA-Z0-9_]*)\s+as\s*\(")
        .unwrap()
});

fn strip_quotes(ident: &str) -> String {
    ident.trim_matches('"').to_lowercase()
}

/// Table identifiers referenced by `sql`, lowercased, deduplicated,
/// in order of first appearance. CTE names are excluded.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let ctes: Vec<String> =
        CTE_NAME_REGEX.captures_iter(sql).map(|c| strip_quotes(&c[1])).collect();

    let mut tables = Vec::new();
    for capture in FROM_JOIN_REGEX.captures_iter(sql) {
        let name = strip_quotes(&capture[1]);
        if !ctes.contains(&name) && !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}
