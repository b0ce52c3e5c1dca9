//! LLM provider abstraction.
//!
//! The guardrail loop only needs "system + user prompt in, text + token
//! usage out". The production implementation speaks an OpenAI-compatible
//! `/v1/chat/completions` endpoint; tests substitute a scripted provider.

use async_trait::async_trait;
use serde::Deserialize;

/// Sampling temperature used for all mission calls.
///
/// Low on purpose: the output contract is strict JSON.
const TEMPERATURE: f64 = 0.15;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// System prompt (identity, tools, scope, budget).
    pub system: String,
    /// User content for this turn.
    pub user: String,
    /// Response token cap.
    pub max_tokens: u32,
}

/// A completion with usage accounting.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Raw text content returned by the model.
    pub content: String,
    /// Prompt tokens consumed.
    pub input_tokens: u32,
    /// Completion tokens produced.
    pub output_tokens: u32,
}

/// Errors from a provider call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure.
    #[error("LLM request failed: {0}")]
    Http(String),

    /// Non-success status from the API.
    #[error("LLM API error: status {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response carried no usable content.
    #[error("LLM response contained no content")]
    MissingContent,
}

/// Minimal async LLM interface used by the guardrail loop.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Model identifier, used for cost estimation.
    fn model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible implementation
// ---------------------------------------------------------------------------

/// Provider speaking the OpenAI-compatible chat-completions protocol.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatCompletionsProvider {
    /// Create a provider for the given endpoint and model.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": TEMPERATURE,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let usage = parsed.usage.unwrap_or_default();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::MissingContent)?;

        Ok(LlmResponse {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
