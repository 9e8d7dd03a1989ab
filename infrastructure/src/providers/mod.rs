//! LLM provider adapters.
//!
//! [`OpenAiGateway`] implements the application's `LlmGateway` port for
//! every OpenAI-compatible endpoint listed under `[[providers]]`.

pub mod openai;
pub mod sse;

#[cfg(test)]
pub(crate) mod mock_server;

pub use openai::{OpenAiGateway, ProviderEndpoint};
pub use sse::SseDecoder;
