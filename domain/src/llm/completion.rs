//! Completion requests, live snapshots, and transcription requests.

use super::message::{ChatMessage, Role};
use super::usage::UsageCounters;
use crate::ui::change::base64_bytes;
use serde::{Deserialize, Serialize};

/// Iteration bound used when a request leaves `Max_iteration` at zero.
pub const DEFAULT_MAX_ITERATION: u32 = 20;

/// A streaming, tool-augmented completion request and its outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmCompletion {
    /// Caller-chosen key used by `llm_find` and `llm_stop`.
    #[serde(rename = "UID", default)]
    pub uid: String,
    /// Provider name as configured under `[[providers]]`.
    #[serde(rename = "AppName", default)]
    pub app_name: String,
    #[serde(rename = "Model", default)]
    pub model: String,

    #[serde(rename = "Temperature", default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "Top_p", default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(rename = "Max_tokens", default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(rename = "Frequency_penalty", default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(rename = "Presence_penalty", default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// `""`, `"text"` or `"json_object"`.
    #[serde(rename = "Response_format", default)]
    pub response_format: String,
    /// JSON Schema the answer must satisfy; implies `json_schema` format.
    #[serde(rename = "Response_schema", default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,

    /// Names of the tool functions the model may call.
    #[serde(rename = "Tools", default)]
    pub tools: Vec<String>,

    #[serde(rename = "SystemMessage", default)]
    pub system_message: String,
    #[serde(rename = "PreviousMessages", default)]
    pub previous_messages: Vec<ChatMessage>,
    #[serde(rename = "UserMessage", default)]
    pub user_message: String,

    #[serde(rename = "Max_iteration", default)]
    pub max_iteration: u32,

    /// Messages produced by this request, starting with the user message.
    #[serde(rename = "Out_messages", default)]
    pub out_messages: Vec<ChatMessage>,
    #[serde(rename = "Out_answer", default)]
    pub out_answer: String,
    #[serde(rename = "Out_reasoning", default)]
    pub out_reasoning: String,
    #[serde(rename = "Out_usage", default)]
    pub out_usage: UsageCounters,
}

impl LlmCompletion {
    pub fn max_iterations(&self) -> u32 {
        if self.max_iteration == 0 {
            DEFAULT_MAX_ITERATION
        } else {
            self.max_iteration
        }
    }

    /// Seed of the last prior message, or 1.
    pub fn seed(&self) -> i64 {
        match self.previous_messages.last() {
            Some(msg) if msg.seed != 0 => msg.seed,
            _ => 1,
        }
    }

    /// System message, prior conversation, then the new user message.
    ///
    /// Returns the full transcript and the index where new messages start.
    pub fn initial_messages(&self) -> (Vec<ChatMessage>, usize) {
        let seed = self.seed();
        let mut messages = Vec::with_capacity(self.previous_messages.len() + 2);
        let has_system = self
            .previous_messages
            .first()
            .is_some_and(|m| m.role == Role::System);
        if !self.system_message.is_empty() && !has_system {
            messages.push(ChatMessage::system(&self.system_message));
        }
        messages.extend(self.previous_messages.iter().cloned());
        let start = messages.len();
        if !self.user_message.is_empty() {
            let mut user = ChatMessage::user(&self.user_message);
            user.seed = seed;
            messages.push(user);
        }
        (messages, start)
    }
}

/// Live view of a running or finished completion, returned by `llm_find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletionSnapshot {
    pub uid: String,
    pub running: bool,
    #[serde(default)]
    pub cancelled: bool,
    /// Transcript so far, including the assistant message being streamed.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Content of the assistant message being streamed.
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub usage: UsageCounters,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub error: String,
}

/// Audio transcription request sent with `llm_transcribe`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscribeRequest {
    /// Provider name.
    #[serde(default)]
    pub app_name: String,
    /// Empty means the provider's configured transcription model.
    #[serde(default)]
    pub model: String,
    #[serde(default, with = "base64_bytes")]
    pub blob: Vec<u8>,
    /// File name announced in the multipart form; its extension names the container.
    #[serde(default = "default_blob_name")]
    pub blob_name: String,
    /// `json`, `text`, `srt`, `verbose_json` or `vtt`.
    #[serde(default)]
    pub response_format: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub temperature: f64,
}

fn default_blob_name() -> String {
    "audio.wav".to_string()
}
