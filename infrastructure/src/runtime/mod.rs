//! Tool-side runtime.
//!
//! A tool binary builds a [`ToolSet`] of [`ToolFunction`]s and hands it to
//! [`ToolRuntime`], which listens for `build` / `change` / `update` from the
//! router. Each request runs on a blocking thread with a [`ToolContext`]
//! for progress, commands, sub-calls and storage; the [`StorageCoalescer`]
//! flushes changed instances after every successful request.

pub mod context;
pub mod error;
pub mod function;
pub mod layout;
pub mod server;
pub mod storage;

pub use context::{PROGRESS_INTERVAL, ToolContext};
pub use error::{RuntimeError, StorageError, ToolError};
pub use function::{ToolFunction, ToolSet};
pub use layout::{NodeId, UiLayout};
pub use server::ToolRuntime;
pub use storage::{InstanceHandle, StorageBackend, StorageCoalescer};
