//! Use cases
//!
//! Application-level operations that orchestrate the registries and ports.

pub mod dispatch_tool;
pub mod microphone;
pub mod run_completion;
