//! Domain layer for tooldesk
//!
//! This crate contains the data model shared by the router and the tool
//! runtime. It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Sessions
//!
//! Every in-flight request gets a [`MsgId`] from the router. The session
//! carries progress, a cancel flag, and a buffer of [`Command`]s that reach
//! the host together with the response.
//!
//! ## UI documents
//!
//! A tool renders a tree of [`UiNode`]s. Node uids are derived from their
//! position, so a [`ChangeEvent`] recorded on one tree can be replayed on a
//! rebuilt one.
//!
//! ## Completions
//!
//! An [`LlmCompletion`] drives a streaming chat loop whose [`ToolCall`]s fan
//! out into tool sub-calls.

pub mod audio;
pub mod command;
pub mod core;
pub mod llm;
pub mod session;
pub mod storage;
pub mod tool;
pub mod ui;

// Re-export commonly used types
pub use audio::{AudioFormat, PcmSpec, wav_encode};
pub use command::{Command, ScrollH, ScrollV, commands_from_json, commands_to_json};
pub use core::{
    error::DomainError,
    interrupt::{Interruption, is_interrupted},
    string::{callstack_suffix, truncate_str},
};
pub use llm::{
    ChatMessage, CompletionSnapshot, LlmCompletion, Role, ToolCall, ToolCallDelta,
    TranscribeRequest, UsageCounters, merge_tool_call_deltas,
};
pub use session::entities::{MsgId, MsgInfo, progress_from_wire, progress_to_wire};
pub use storage::{StorageFormat, default_instance_path, validate_relative_path};
pub use tool::{
    BuildReply, ChangeReply, Endpoint, SHOWN_ON_SCREEN, ToolSchema, UpdateReply,
    format_tool_result, validate_app_name,
};
pub use ui::{
    change::ChangeEvent,
    document::{GridSize, UiNode},
    uid::{GridCoord, Uid},
    widget::{MapView, PaintCommand, Rgba, Widget, WidgetValue},
};
