//! Side-effect commands a tool asks the host to perform.
//!
//! Commands are emitted during `build`/`change`/`update`, buffered in the
//! request's session, and flushed to the host together with the response.
//! Order is significant: the host applies them in buffer order.

use crate::ui::uid::Uid;
use serde::{Deserialize, Serialize};

/// Vertical scroll target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollV {
    Top,
    Bottom,
    /// Scroll to bottom only if the view is already at the bottom.
    BottomIf,
}

/// Horizontal scroll target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollH {
    Left,
    Right,
}

/// A side effect requested by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum Command {
    OpenDialog {
        #[serde(rename = "UiId")]
        ui_id: Uid,
        #[serde(rename = "RelativeId", default, skip_serializing_if = "Option::is_none")]
        relative_id: Option<Uid>,
        #[serde(rename = "OnTouch", default, skip_serializing_if = "Option::is_none")]
        on_touch: Option<Uid>,
    },
    CloseDialog {
        #[serde(rename = "UiId")]
        ui_id: Uid,
    },
    ActivateEditbox {
        #[serde(rename = "Name")]
        name: String,
    },
    ScrollV {
        #[serde(rename = "TargetId")]
        target_id: Uid,
        #[serde(rename = "To")]
        to: ScrollV,
    },
    ScrollH {
        #[serde(rename = "TargetId")]
        target_id: Uid,
        #[serde(rename = "To")]
        to: ScrollH,
    },
    SetClipboard {
        #[serde(rename = "Text")]
        text: String,
    },
}

impl Command {
    pub fn open_centered(ui_id: Uid) -> Self {
        Command::OpenDialog {
            ui_id,
            relative_id: None,
            on_touch: None,
        }
    }

    pub fn open_relative(ui_id: Uid, relative_id: Uid) -> Self {
        Command::OpenDialog {
            ui_id,
            relative_id: Some(relative_id),
            on_touch: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::OpenDialog { .. } => "OpenDialog",
            Command::CloseDialog { .. } => "CloseDialog",
            Command::ActivateEditbox { .. } => "ActivateEditbox",
            Command::ScrollV { .. } => "ScrollV",
            Command::ScrollH { .. } => "ScrollH",
            Command::SetClipboard { .. } => "SetClipboard",
        }
    }
}

/// Serialize a command list to the JSON carried on the wire.
pub fn commands_to_json(commands: &[Command]) -> Result<String, serde_json::Error> {
    serde_json::to_string(commands)
}

/// Parse a command list from the wire. Empty input means "no commands".
pub fn commands_from_json(json: &[u8]) -> Result<Vec<Command>, serde_json::Error> {
    if json.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(json)
}
