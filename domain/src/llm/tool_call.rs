//! Tool calls emitted by the model, and merging of their streamed deltas.

use serde::{Deserialize, Serialize};

/// Function half of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON text; may be incomplete while streaming.
    #[serde(default)]
    pub arguments: String,
}

/// A tool call as it appears in an assistant message (OpenAI shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl Default for ToolCall {
    fn default() -> Self {
        Self {
            id: String::new(),
            call_type: function_type(),
            function: FunctionCall::default(),
        }
    }
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Arguments as a JSON object text; blank arguments become `{}`.
    pub fn arguments_json(&self) -> &str {
        let trimmed = self.function.arguments.trim();
        if trimmed.is_empty() { "{}" } else { trimmed }
    }
}

/// Partial function data in a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// One element of `choices[0].delta.tool_calls` in a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Some providers omit the index when they send whole calls.
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Upper bound on the call index accepted from a stream.
pub const MAX_TOOL_CALLS: usize = 64;

/// Merge streamed deltas into `calls`, keyed by call index.
///
/// Ids and names are set from the first delta that carries them; argument
/// fragments are appended. A delta without an index starts a new call.
pub fn merge_tool_call_deltas(calls: &mut Vec<ToolCall>, deltas: &[ToolCallDelta]) {
    for delta in deltas {
        let index = delta.index.unwrap_or(calls.len());
        if index >= MAX_TOOL_CALLS {
            continue;
        }
        while calls.len() <= index {
            calls.push(ToolCall::default());
        }
        let call = &mut calls[index];

        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                if call.function.name.is_empty() {
                    call.function.name = name.to_string();
                }
            }
            if let Some(arguments) = &function.arguments {
                call.function.arguments.push_str(arguments);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index: Some(index),
            id: id.map(str::to_string),
            function: Some(FunctionDelta {
                name: name.map(str::to_string),
                arguments: Some(args.to_string()),
            }),
        }
    }

    #[test]
    fn fragments_are_merged_by_index() {
        let mut calls = Vec::new();
        merge_tool_call_deltas(
            &mut calls,
            &[delta(0, Some("call_1"), Some("ShowActivityStatistic"), "{\"Activ")],
        );
        merge_tool_call_deltas(&mut calls, &[delta(1, Some("call_2"), Some("Ping"), "")]);
        merge_tool_call_deltas(&mut calls, &[delta(0, None, None, "ityID\":\"42\"}")]);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name(), "ShowActivityStatistic");
        assert_eq!(calls[0].arguments_json(), "{\"ActivityID\":\"42\"}");
        assert_eq!(calls[1].arguments_json(), "{}");
    }

    #[test]
    fn missing_index_appends_whole_call() {
        let mut calls = Vec::new();
        let whole = ToolCallDelta {
            index: None,
            id: Some("a".to_string()),
            function: Some(FunctionDelta {
                name: Some("Ping".to_string()),
                arguments: Some("{}".to_string()),
            }),
        };
        merge_tool_call_deltas(&mut calls, &[whole.clone(), whole]);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn oversized_index_is_ignored() {
        let mut calls = Vec::new();
        merge_tool_call_deltas(&mut calls, &[delta(MAX_TOOL_CALLS, Some("x"), Some("X"), "")]);
        assert!(calls.is_empty());
    }

    #[test]
    fn serializes_in_openai_shape() {
        let call = ToolCall::new("call_1", "Ping", "{}");
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "Ping");
    }
}
