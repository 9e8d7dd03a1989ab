//! Encrypted secret store.
//!
//! API keys and other credentials live in a single AES-256-GCM sealed file.
//! The router looks provider keys up by alias; `tooldesk secrets` edits it.

mod store;

pub use store::{SecretStore, SecretsError};
