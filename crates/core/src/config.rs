//! Engine configuration
//!
//! All knobs are plain fields with documented defaults; `from_env` applies
//! `QUERYLOOM_`-prefixed overrides. Nothing in the engine reads the
//! environment directly.

use std::time::Duration;

use crate::constants;
use crate::env_config::env_parse_with_default;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum repair cycles after the initial attempt
    pub retry_bound: u32,
    /// Hard cap on retrieved context items
    pub top_k: usize,
    /// Items scoring below this are dropped from retrieval results
    pub min_relevance: f64,
    /// LIMIT injected when a candidate is only missing a result bound
    pub default_limit: u32,
    /// Timeout applied to the draft collaborator call
    pub draft_timeout: Duration,
    /// Timeout applied to the execution collaborator call
    pub execute_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_bound: constants::DEFAULT_RETRY_BOUND,
            top_k: constants::DEFAULT_TOP_K,
            min_relevance: constants::DEFAULT_MIN_RELEVANCE,
            default_limit: constants::DEFAULT_ROW_LIMIT,
            draft_timeout: Duration::from_secs(constants::DEFAULT_DRAFT_TIMEOUT_SECS),
            execute_timeout: Duration::from_secs(constants::DEFAULT_EXECUTE_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Defaults with `QUERYLOOM_*` environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retry_bound: env_parse_with_default("QUERYLOOM_RETRY_BOUND", defaults.retry_bound),
            top_k: env_parse_with_default("QUERYLOOM_TOP_K", defaults.top_k),
            min_relevance: env_parse_with_default(
                "QUERYLOOM_MIN_RELEVANCE",
                defaults.min_relevance,
            ),
            default_limit: env_parse_with_default(
                "QUERYLOOM_DEFAULT_LIMIT",
                defaults.default_limit,
            ),
            draft_timeout: Duration::from_secs(env_parse_with_default(
                "QUERYLOOM_DRAFT_TIMEOUT_SECS",
                constants::DEFAULT_DRAFT_TIMEOUT_SECS,
            )),
            execute_timeout: Duration::from_secs(env_parse_with_default(
                "QUERYLOOM_EXECUTE_TIMEOUT_SECS",
                constants::DEFAULT_EXECUTE_TIMEOUT_SECS,
            )),
        }
    }
}
