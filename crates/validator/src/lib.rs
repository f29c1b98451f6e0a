//! Static read-only safety analysis for candidate SQL
//!
//! Purely lexical: nothing here parses SQL into an AST or touches a
//! database. Checks run in a fixed order and every check class is
//! evaluated, so a single validation pass reports all findings at once.
//! Blocking findings prevent execution and route the session to repair;
//! warnings are surfaced but do not block.

mod checks;
mod ranking;
mod tables;

pub use checks::{inject_limit, validate};
pub use ranking::is_ranking_question;
pub use tables::referenced_tables;
