use crate::ai_types::{ChatRequest, ChatResponse};
use crate::error::LlmError;

/// Default chat model to use.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Client for OpenAI-compatible chat-completion APIs.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmClient {
    /// Creates a new client with the given API key and base URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built (TLS backend failure).
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        let model =
            std::env::var("QUERYLOOM_DRAFT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned());
        let base_url = base_url.trim_end_matches('/').to_owned();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ClientInit(e.to_string()))?;
        // Deterministic drafts as far as the API allows
        Ok(Self { client, api_key, base_url, model, temperature: 0.0 })
    }

    /// Sets a custom model for this client.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Returns the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat completion and return the first choice's content.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails after retries, the API
    /// returns a non-success status, or the response cannot be parsed.
    pub async fn chat_completion(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, LlmError> {
        const MAX_RETRIES: usize = 3;
        const RETRY_DELAYS: [u64; 4] = [0, 1, 2, 4];
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                crate::ai_types::Message { role: "system".to_owned(), content: system.to_owned() },
                crate::ai_types::Message { role: "user".to_owned(), content: user.to_owned() },
            ],
            temperature: self.temperature,
        };
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay_secs = RETRY_DELAYS.get(attempt).copied().unwrap_or(4);
                tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
                tracing::warn!("draft retry attempt {attempt}/{MAX_RETRIES}");
            }

            let response = match self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::HttpRequest(e));
                    continue;
                },
            };

            let status = response.status();
            if status.is_success() {
                let body = match response.text().await {
                    Ok(b) => b,
                    Err(e) => {
                        last_error = Some(LlmError::HttpRequest(e));
                        continue;
                    },
                };
                let parsed: ChatResponse =
                    serde_json::from_str(&body).map_err(|e| LlmError::JsonParse {
                        context: format!("chat completion response (body: {})", truncate(&body, 200)),
                        source: e,
                    })?;
                let first = parsed.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
                return Ok(first.message.content);
            }

            let err = LlmError::HttpStatus {
                code: status.as_u16(),
                body: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "could not read error body".to_owned()),
            };
            if err.is_transient() {
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(LlmError::RetriesExhausted(Box::new(last_error.unwrap_or(LlmError::EmptyResponse))))
    }
}

/// Truncates a string to the given maximum length at a char boundary.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s.get(..end).unwrap_or("")
    }
}
