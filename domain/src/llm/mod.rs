//! LLM completion domain: messages, tool calls, usage, and requests.

pub mod completion;
pub mod message;
pub mod tool_call;
pub mod usage;

pub use completion::{CompletionSnapshot, DEFAULT_MAX_ITERATION, LlmCompletion, TranscribeRequest};
pub use message::{ChatMessage, Role};
pub use tool_call::{FunctionCall, ToolCall, ToolCallDelta, merge_tool_call_deltas};
pub use usage::{ModelPrice, UsageCounters, find_price};
