//! Infrastructure layer for tooldesk
//!
//! Adapters for the ports defined in the application layer, plus the two
//! wire-facing halves of the system: the router server (host side) and the
//! tool runtime (linked into every tool binary).

pub mod audio;
pub mod config;
pub mod corpus;
pub mod fs_store;
pub mod launcher;
pub mod logging;
pub mod providers;
pub mod router;
pub mod runtime;
pub mod secrets;
pub mod wire;


// Re-export commonly used types
pub use audio::CommandAudioCapture;
pub use config::{ConfigLoader, ConfigValidationError, FileConfig};
pub use corpus::AppCorpus;
pub use fs_store::FsFileStore;
pub use launcher::ProcessLauncher;
pub use logging::JsonlConversationLogger;
pub use providers::{OpenAiGateway, ProviderEndpoint};
pub use router::{RouterClient, RouterClientError, RouterServer, RouterState, ToolClient};
pub use runtime::{
    InstanceHandle, NodeId, ToolContext, ToolError, ToolFunction, ToolRuntime, ToolSet, UiLayout,
};
pub use secrets::{SecretStore, SecretsError};
pub use wire::{FrameConn, WireError};
