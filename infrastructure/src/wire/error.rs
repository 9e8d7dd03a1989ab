//! Error types for the frame codec

use thiserror::Error;

/// Result type alias for wire operations
pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection closed mid-frame")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(u64),

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::UnexpectedEof
        } else {
            WireError::Io(e)
        }
    }
}

impl WireError {
    /// True when the peer could not be reached or hung up.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WireError::Connect { .. } | WireError::UnexpectedEof | WireError::Io(_)
        )
    }
}
