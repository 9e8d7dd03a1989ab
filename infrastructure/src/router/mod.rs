//! Router wire adapters.
//!
//! - [`server`]: the loopback TCP server tools and the host talk to
//! - [`client`]: the caller side of the same protocol
//! - [`tool_client`]: router → tool transport

pub mod client;
pub(crate) mod handler;
pub mod server;
pub mod tool_client;

pub use client::{RouterClient, RouterClientError};
pub use server::{RouterServer, RouterState};
pub use tool_client::ToolClient;
