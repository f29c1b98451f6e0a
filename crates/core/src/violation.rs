//! Safety validator verdict types

use serde::{Deserialize, Serialize};

/// What a safety check found wrong with a candidate query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Data-modifying keyword or multiple statements
    NonReadOnly,
    /// `SELECT *` instead of an explicit column list
    WildcardProjection,
    /// No `LIMIT` clause
    MissingLimit,
    /// Ranking question without `ORDER BY`
    MissingOrder,
    /// Referenced table outside the session's permitted scope
    OutOfScopeTable,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonReadOnly => "non_read_only",
            Self::WildcardProjection => "wildcard_projection",
            Self::MissingLimit => "missing_limit",
            Self::MissingOrder => "missing_order",
            Self::OutOfScopeTable => "out_of_scope_table",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Prevents execution; routes the session to repair
    Blocking,
    /// Surfaced but does not block execution
    Warning,
}

/// One finding from the safety validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub severity: Severity,
}

impl Violation {
    pub fn blocking(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), severity: Severity::Blocking }
    }

    pub fn warning(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), severity: Severity::Warning }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// Ordered outcome of validating one candidate query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidatorResult {
    Pass,
    Violations(Vec<Violation>),
}

impl ValidatorResult {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.is_empty() { Self::Pass } else { Self::Violations(violations) }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Pass => &[],
            Self::Violations(v) => v,
        }
    }

    pub fn has_blocking(&self) -> bool {
        self.violations().iter().any(Violation::is_blocking)
    }

    /// Warnings and blocking findings of one kind only.
    pub fn only(&self, kind: ViolationKind) -> bool {
        let v = self.violations();
        !v.is_empty() && v.iter().all(|violation| violation.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_when_no_violations() {
        let result = ValidatorResult::from_violations(vec![]);
        assert!(matches!(result, ValidatorResult::Pass));
        assert!(!result.has_blocking());
    }

    #[test]
    fn only_matches_single_kind() {
        let result = ValidatorResult::from_violations(vec![Violation::warning(
            ViolationKind::MissingLimit,
            "no LIMIT clause",
        )]);
        assert!(result.only(ViolationKind::MissingLimit));
        assert!(!result.only(ViolationKind::MissingOrder));
        assert!(!result.has_blocking());
    }

    #[test]
    fn mixed_kinds_are_not_only() {
        let result = ValidatorResult::from_violations(vec![
            Violation::warning(ViolationKind::MissingLimit, "no LIMIT clause"),
            Violation::blocking(ViolationKind::WildcardProjection, "SELECT *"),
        ]);
        assert!(!result.only(ViolationKind::MissingLimit));
        assert!(result.has_blocking());
    }
}
