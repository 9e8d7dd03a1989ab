//! Transcript logging.
//!
//! [`JsonlConversationLogger`] appends the completion engine's
//! [`ConversationEvent`](tooldesk_application::ConversationEvent)s to a JSONL
//! file, one object per line.

mod jsonl_logger;

pub use jsonl_logger::JsonlConversationLogger;
