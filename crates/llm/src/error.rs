//! Typed error enums for the drafting crate.

use thiserror::Error;

/// Errors from the underlying chat-completion transport.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("HTTP status {code}: {body}")]
    HttpStatus { code: u16, body: String },
    #[error("JSON parse error in {context}: {source}")]
    JsonParse {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("empty response: no choices returned")]
    EmptyResponse,
    #[error("client initialization failed: {0}")]
    ClientInit(String),
    #[error("all retries exhausted, last error: {0}")]
    RetriesExhausted(Box<LlmError>),
}

impl LlmError {
    /// Whether this error is transient and should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpRequest(_) => true,
            Self::HttpStatus { code, .. } => matches!(code, 429 | 500 | 502 | 503 | 529),
            _ => false,
        }
    }
}

/// Failure of the draft step as the orchestrator sees it.
///
/// The orchestrator does not care why the collaborator failed: any
/// unavailability is repair input, bounded by the session's retry count.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("generation unavailable: {0}")]
    Unavailable(String),
}

impl From<LlmError> for DraftError {
    fn from(err: LlmError) -> Self {
        Self::Unavailable(err.to_string())
    }
}
