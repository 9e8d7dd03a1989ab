//! Application layer for tooldesk
//!
//! Registries for the router's shared state, port definitions for the
//! adapters, and the use cases that combine them. Depends only on the
//! domain layer.

pub mod config;
pub mod ports;
pub mod registry;
pub mod use_cases;

// Re-export commonly used types
pub use config::{CompletionParams, DispatchParams};
pub use ports::{
    app_catalog::{AppCatalog, CatalogError, EmptyCatalog},
    audio_capture::{AudioCapture, CaptureError, CaptureSession},
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    file_store::{FileStore, StoreError},
    llm_gateway::{ChatEvent, ChatRequest, GatewayError, LlmGateway, StreamHandle},
    tool_launcher::{LaunchError, NoLauncher, ToolLauncher},
    tool_transport::{BuildRequest, ToolTransport, TransportError},
};
pub use registry::{
    CompletionRegistry, CompletionTicket, EndpointRegistry, RegistryError, SessionGuard,
    SessionRegistry,
};
pub use use_cases::dispatch_tool::{DispatchError, ToolDispatcher};
pub use use_cases::microphone::{MicrophoneBridge, MicrophoneError};
pub use use_cases::run_completion::{CompletionError, CompletionOutcome, RunCompletionUseCase};
