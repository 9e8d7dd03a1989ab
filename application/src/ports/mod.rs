//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod app_catalog;
pub mod audio_capture;
pub mod conversation_logger;
pub mod file_store;
pub mod llm_gateway;
pub mod tool_launcher;
pub mod tool_transport;
