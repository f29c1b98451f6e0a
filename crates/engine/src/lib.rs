//! Repair orchestrator
//!
//! Drives one question→answer transaction through the
//! `SEARCH → DRAFT → VALIDATE → EXECUTE → {SUCCESS, REPAIR}` state
//! machine with bounded repair cycles, and owns the explicit persistence
//! operations that grow the knowledge and learning stores afterwards.

mod capabilities;
mod engine;
mod error;
mod persist;

pub use capabilities::Capabilities;
pub use engine::{QueryEngine, QueryEngineBuilder};
pub use error::EngineError;

#[cfg(test)]
mod tests;
