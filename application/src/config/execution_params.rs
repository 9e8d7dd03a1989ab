//! Execution parameters for the use case loops.
//!
//! [`DispatchParams`] controls how the router reaches tools and
//! [`CompletionParams`] bounds the completion loop. These are
//! application-layer concerns, filled in from the `[router]` and
//! `[completion]` config sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tooldesk_domain::llm::DEFAULT_MAX_ITERATION;

/// Tool dispatch parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchParams {
    /// How long a lazily spawned tool has to `register`.
    pub spawn_timeout: Duration,
}

impl Default for DispatchParams {
    fn default() -> Self {
        Self {
            spawn_timeout: Duration::from_secs(10),
        }
    }
}

impl DispatchParams {
    pub fn with_spawn_timeout(mut self, timeout: Duration) -> Self {
        self.spawn_timeout = timeout;
        self
    }
}

/// Completion loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Iteration bound for requests that leave `Max_iteration` at zero.
    pub default_max_iteration: u32,
    /// Minimum gap between progress updates while streaming.
    pub progress_interval: Duration,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            default_max_iteration: DEFAULT_MAX_ITERATION,
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl CompletionParams {
    pub fn with_default_max_iteration(mut self, max: u32) -> Self {
        self.default_max_iteration = max.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}
