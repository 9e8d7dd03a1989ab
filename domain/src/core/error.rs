//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("UID not found: {0}")]
    UidNotFound(u64),

    #[error("Invalid app name: {0}")]
    InvalidAppName(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid storage format: {0}")]
    InvalidStorageFormat(String),

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("Invalid change event: {0}")]
    InvalidChangeEvent(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl DomainError {
    /// Check if this error means a widget lookup failed
    pub fn is_uid_not_found(&self) -> bool {
        matches!(self, DomainError::UidNotFound(_))
    }
}
