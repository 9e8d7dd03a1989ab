//! Errors raised inside a tool process.

use crate::router::RouterClientError;
use crate::wire::WireError;
use thiserror::Error;
use tooldesk_domain::{DomainError, Interruption, callstack_suffix};

/// Storage coalescer failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: RouterClientError,
    },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },

    #[error("Instance {path} is cached with a different type")]
    TypeMismatch { path: String },

    #[error(transparent)]
    InvalidPath(#[from] DomainError),
}

/// Error returned by tool functions and widget callbacks.
///
/// At the RPC boundary it becomes `error_text`: interruptions render as
/// their sentinel, everything else gets the callstack suffix.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    Interrupted(Interruption),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Router(#[from] RouterClientError),

    #[error("Invalid parameters: {0}")]
    Params(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ToolError {
    pub fn msg(text: impl Into<String>) -> Self {
        ToolError::Message(text.into())
    }

    pub fn interrupted() -> Self {
        ToolError::Interrupted(Interruption::Request)
    }

    pub fn is_interrupted(&self) -> bool {
        match self {
            ToolError::Interrupted(_) => true,
            ToolError::Router(RouterClientError::Remote(text)) => {
                Interruption::from_error_text(text).is_some()
            }
            _ => false,
        }
    }

    /// Render for the wire. `kind` picks the sentinel used when the request
    /// was interrupted.
    pub fn to_error_text(&self, kind: Interruption, function: &str, params_json: &str) -> String {
        if self.is_interrupted() {
            return kind.as_str().to_string();
        }
        format!("{}{}", self, callstack_suffix(function, params_json))
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Startup and accept-loop failures of the runtime itself.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("usage: <app_name> <router_port>")]
    Usage,

    #[error("Invalid router port: {0}")]
    InvalidPort(String),

    #[error("No free port in {first}..{last}")]
    NoFreePort { first: u32, last: u32 },

    #[error("Failed to register with router: {0}")]
    Register(#[source] RouterClientError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruptions_render_as_bare_sentinel() {
        let err = ToolError::interrupted();
        assert_eq!(
            err.to_error_text(Interruption::Change, "Edit", "{}"),
            "_change_interrupted_"
        );
    }

    #[test]
    fn remote_interruption_is_recognised() {
        let err = ToolError::Router(RouterClientError::Remote("_interrupted_".to_string()));
        assert!(err.is_interrupted());
    }

    #[test]
    fn failures_carry_callstack_suffix() {
        let err = ToolError::msg("disk full");
        assert_eq!(
            err.to_error_text(
                Interruption::Request,
                "SaveNote",
                r#"{"Title":"a very long title indeed"}"#
            ),
            "disk full\nSaveNote({\"Title\":\"a very lon)"
        );
    }
}
