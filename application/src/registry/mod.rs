//! Shared router state: endpoints, sessions, and completion sessions.
//!
//! Each table is guarded by its own lock so unrelated RPCs never contend.

pub mod completions;
pub mod endpoints;
pub mod sessions;

pub use completions::{CompletionRegistry, CompletionTicket};
pub use endpoints::EndpointRegistry;
pub use sessions::{SessionGuard, SessionRegistry};

use thiserror::Error;
use tooldesk_domain::MsgId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    SessionNotFound(MsgId),

    #[error("not found: {0}")]
    NameNotFound(String),

    #[error("Completion not found: {0}")]
    CompletionNotFound(String),

    #[error("Completion already running: {0}")]
    CompletionRunning(String),
}
