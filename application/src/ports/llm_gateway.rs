//! LLM Gateway port
//!
//! Defines how the completion engine talks to OpenAI-compatible providers.
//! Providers are addressed by the name configured under `[[providers]]`;
//! the adapter resolves base URL and API key.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tooldesk_domain::{
    ChatMessage, LlmCompletion, ToolCallDelta, ToolSchema, TranscribeRequest, UsageCounters,
};

/// Errors that can occur during LLM gateway operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Missing API key for provider {0}")]
    MissingApiKey(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed stream chunk: {0}")]
    Parse(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

/// One provider request built from an [`LlmCompletion`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub response_format: String,
    pub response_schema: Option<serde_json::Value>,
    pub seed: i64,
}

impl ChatRequest {
    pub fn from_completion(
        completion: &LlmCompletion,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        seed: i64,
    ) -> Self {
        Self {
            provider: completion.app_name.clone(),
            model: completion.model.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            temperature: completion.temperature,
            top_p: completion.top_p,
            max_tokens: completion.max_tokens,
            frequency_penalty: completion.frequency_penalty,
            presence_penalty: completion.presence_penalty,
            response_format: completion.response_format.clone(),
            response_schema: completion.response_schema.clone(),
            seed,
        }
    }

    /// OpenAI `POST /chat/completions` body with `stream: true`.
    pub fn to_openai_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "stream": true,
            "stream_options": {"include_usage": true},
            "seed": self.seed,
            "messages": self.messages.iter().map(ChatMessage::to_openai).collect::<Vec<_>>(),
        });
        if !self.tools.is_empty() {
            body["tools"] = self.tools.iter().map(ToolSchema::to_openai).collect();
        }
        let optional = [
            ("temperature", self.temperature),
            ("top_p", self.top_p),
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                body[key] = serde_json::json!(v);
            }
        }
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if let Some(schema) = &self.response_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {"name": "response", "schema": schema, "strict": true},
            });
        } else if !self.response_format.is_empty() {
            body["response_format"] = serde_json::json!({"type": self.response_format});
        }
        body
    }
}

/// Incremental event decoded from the provider's SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Content(String),
    Reasoning(String),
    ToolCalls(Vec<ToolCallDelta>),
    /// Token counts; prices are filled in by the engine.
    Usage(UsageCounters),
    /// `data: [DONE]` or end of body.
    Done,
    Error(GatewayError),
}

/// Handle for receiving streaming events from one provider call.
///
/// Dropping the handle stops the reader task, which drops the HTTP response
/// and closes the connection.
pub struct StreamHandle {
    pub receiver: mpsc::Receiver<ChatEvent>,
}

impl StreamHandle {
    pub fn new(receiver: mpsc::Receiver<ChatEvent>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.receiver.recv().await
    }
}

/// Gateway for LLM communication
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Start a streaming chat completion.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<StreamHandle, GatewayError>;

    /// Post an audio blob for transcription; returns the raw response body.
    async fn transcribe(&self, request: &TranscribeRequest) -> Result<Vec<u8>, GatewayError>;
}
