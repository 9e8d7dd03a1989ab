//! Port for structured conversation logging.
//!
//! The completion engine records every provider round-trip and every tool
//! call it fans out through [`ConversationLogger`]. This is separate from
//! `tracing`: tracing carries diagnostics, this port carries the transcript
//! in a machine-readable form (JSONL in the file adapter).

use serde_json::Value;

/// A structured conversation event.
///
/// Event types used by the engine: `llm_request`, `llm_response`,
/// `tool_call`, `tool_result`.
pub struct ConversationEvent {
    pub event_type: &'static str,
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Sink for conversation events.
///
/// `log` is synchronous and infallible; adapters swallow their own I/O
/// failures so logging never interrupts a completion.
pub trait ConversationLogger: Send + Sync {
    fn log(&self, event: ConversationEvent);
}

/// Logger used when no transcript file is configured.
pub struct NoConversationLogger;

impl ConversationLogger for NoConversationLogger {
    fn log(&self, _event: ConversationEvent) {}
}
