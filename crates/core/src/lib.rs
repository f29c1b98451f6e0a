//! Core types and constants for queryloom
//!
//! This crate contains domain types shared across all other crates:
//! knowledge/learning items, query sessions and their attempt traces,
//! validator violations, execution error classification, and engine
//! configuration.

mod cancel;
mod config;
mod constants;
mod env_config;
mod execution;
mod item;
mod session;
mod violation;

pub use cancel::*;
pub use config::*;
pub use constants::*;
pub use env_config::*;
pub use execution::*;
pub use item::*;
pub use session::*;
pub use violation::*;
