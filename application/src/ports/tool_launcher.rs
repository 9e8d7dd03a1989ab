//! Tool launcher port
//!
//! Starts tool processes on demand. The launched process registers itself
//! with the router; the launcher does not wait for that.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn {app}: {source}")]
    Spawn {
        app: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait ToolLauncher: Send + Sync {
    /// Spawn `app` pointed at `router_port`.
    ///
    /// Returns `Ok(false)` when the corpus has no binary for `app`.
    fn launch(&self, app: &str, router_port: u16) -> Result<bool, LaunchError>;
}

/// Launcher for setups where every tool is started externally.
pub struct NoLauncher;

impl ToolLauncher for NoLauncher {
    fn launch(&self, _app: &str, _router_port: u16) -> Result<bool, LaunchError> {
        Ok(false)
    }
}
