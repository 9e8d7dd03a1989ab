//! Cooperative cancellation sentinels.
//!
//! Cancellation travels across process boundaries as plain `error_text`.
//! The host recognises these exact strings so it can suppress error dialogs
//! for work the user stopped on purpose.

use serde::{Deserialize, Serialize};

/// Generic interruption, returned by any request that observed a stop.
pub const INTERRUPTED: &str = "_interrupted_";

/// Interruption observed while replaying a change event.
pub const CHANGE_INTERRUPTED: &str = "_change_interrupted_";

/// Interruption observed inside a tool invoked by the completion engine.
pub const TOOL_INTERRUPTED: &str = "_tool_interrupted_";

/// Where an interruption was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Request,
    Change,
    Tool,
}

impl Interruption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interruption::Request => INTERRUPTED,
            Interruption::Change => CHANGE_INTERRUPTED,
            Interruption::Tool => TOOL_INTERRUPTED,
        }
    }

    /// Parse an `error_text` back into an interruption, ignoring any
    /// callstack suffix appended after the first line.
    pub fn from_error_text(text: &str) -> Option<Self> {
        match text.lines().next().unwrap_or("") {
            INTERRUPTED => Some(Interruption::Request),
            CHANGE_INTERRUPTED => Some(Interruption::Change),
            TOOL_INTERRUPTED => Some(Interruption::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Interruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `error_text` reports a cancellation rather than a failure.
pub fn is_interrupted(error_text: &str) -> bool {
    Interruption::from_error_text(error_text).is_some()
}
