//! Tool reply value objects and `Out_*` result formatting.
//!
//! Parameter records use a naming convention for their results: every
//! field whose name starts with `Out_` is an output. When the completion
//! engine feeds a tool reply back to the model it only shows these fields.

use crate::command::Command;
use crate::ui::document::UiNode;
use serde_json::Value;

/// Appended to a tool result when the tool also rendered a UI.
pub const SHOWN_ON_SCREEN: &str = "Successfully shown on screen.";

/// Prefix marking an output field of a parameter record.
pub const OUTPUT_PREFIX: &str = "Out_";

/// Reply of a tool `build`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReply {
    /// Parameter record after `run`, as JSON.
    pub params_json: String,
    /// UI document, as JSON.
    pub ui_json: String,
    pub commands: Vec<Command>,
}

impl BuildReply {
    /// Text handed to the LLM as the `tool` message content.
    pub fn tool_result(&self) -> String {
        format_tool_result(&self.params_json, &self.ui_json)
    }
}

/// Reply of a tool `change`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeReply {
    pub params_json: String,
    pub commands: Vec<Command>,
}

/// Reply of a tool `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReply {
    pub ui_json: String,
    pub commands: Vec<Command>,
}

/// True when `ui_json` carries no visible widgets.
pub fn ui_is_empty(ui_json: &str) -> bool {
    let trimmed = ui_json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return true;
    }
    match serde_json::from_str::<UiNode>(trimmed) {
        Ok(node) => node.is_empty(),
        Err(_) => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render the `Out_*` fields of `params_json` for the model.
///
/// A single output renders as its bare value. Several outputs render as
/// `name(type): value` lines with the prefix stripped. A non-empty UI adds
/// [`SHOWN_ON_SCREEN`] on its own line.
pub fn format_tool_result(params_json: &str, ui_json: &str) -> String {
    let outputs: Vec<(String, Value)> = match serde_json::from_str::<Value>(params_json) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(k, _)| k.starts_with(OUTPUT_PREFIX))
            .collect(),
        _ => Vec::new(),
    };

    let mut text = match outputs.as_slice() {
        [] => String::new(),
        [(_, value)] => scalar_text(value),
        many => many
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}({}): {}",
                    &name[OUTPUT_PREFIX.len()..],
                    type_name(value),
                    scalar_text(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    if !ui_is_empty(ui_json) {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(SHOWN_ON_SCREEN);
    }
    text
}
