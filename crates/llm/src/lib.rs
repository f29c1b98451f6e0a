//! Candidate-SQL drafting collaborator
//!
//! The only step of the repair loop whose output may differ given
//! identical inputs (model non-determinism). Everything the model needs
//! (retrieved context, schema hints, prior failures) travels in the
//! `DraftRequest`; the drafter holds no session state.

mod ai_types;
mod client;
mod drafter;
mod error;

pub use client::{LlmClient, truncate};
pub use drafter::{DraftRequest, LlmDrafter, PriorFailure, SqlDrafter};
pub use error::{DraftError, LlmError};
