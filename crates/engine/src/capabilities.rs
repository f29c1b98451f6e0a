//! Collaborator capability set
//!
//! Resolved once at engine construction: which optional collaborators are
//! wired in decides what the state machine can do for the whole process
//! lifetime. No step inspects availability at runtime.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Semantic scoring available (embedding collaborator configured)
    pub semantic_search: bool,
    /// Live schema fallback available
    pub introspection: bool,
}

impl Capabilities {
    pub(crate) fn resolve(semantic_search: bool, introspection: bool) -> Self {
        let caps = Self { semantic_search, introspection };
        tracing::info!(
            semantic_search = caps.semantic_search,
            introspection = caps.introspection,
            "engine capabilities resolved"
        );
        caps
    }
}
