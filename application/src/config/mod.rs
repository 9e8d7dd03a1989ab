//! Application-level configuration.
//!
//! - [`DispatchParams`]: tool spawn timeout
//! - [`CompletionParams`]: completion iteration bound and progress cadence

pub mod execution_params;

pub use execution_params::{CompletionParams, DispatchParams};
