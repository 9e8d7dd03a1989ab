//! Tool domain module
//!
//! A tool is an independently compiled process implementing one app. The
//! router knows it as an [`Endpoint`]; the LLM knows its functions through
//! [`ToolSchema`]s; its replies come back as [`BuildReply`],
//! [`ChangeReply`] and [`UpdateReply`].

pub mod entities;
pub mod value_objects;

pub use entities::{Endpoint, ToolSchema, validate_app_name};
pub use value_objects::{
    BuildReply, ChangeReply, SHOWN_ON_SCREEN, UpdateReply, format_tool_result, ui_is_empty,
};
