//! Router TCP server.
//!
//! One task per accepted connection; each connection carries one command
//! and its reply. Shared state lives in the application registries, each
//! behind its own lock.

use super::handler;
use crate::wire::{FrameConn, Result};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tooldesk_application::ports::file_store::FileStore;
use tooldesk_application::{
    CompletionRegistry, MicrophoneBridge, RunCompletionUseCase, ToolDispatcher,
};
use tracing::{debug, info, warn};

/// Everything a router command can touch.
pub struct RouterState {
    pub dispatcher: Arc<ToolDispatcher>,
    pub completions: Arc<CompletionRegistry>,
    pub engine: Arc<RunCompletionUseCase>,
    pub microphone: Arc<MicrophoneBridge>,
    pub files: Arc<dyn FileStore>,
    /// Source of uids for completions submitted without one.
    pub(crate) next_completion: AtomicU64,
}

impl RouterState {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        engine: Arc<RunCompletionUseCase>,
        microphone: Arc<MicrophoneBridge>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            dispatcher,
            completions: CompletionRegistry::new(),
            engine,
            microphone,
            files,
            next_completion: AtomicU64::new(1),
        }
    }
}

pub struct RouterServer {
    listener: TcpListener,
    state: Arc<RouterState>,
    port: u16,
}

impl RouterServer {
    /// Bind `127.0.0.1:port`; port 0 picks an ephemeral port.
    pub async fn bind(port: u16, state: Arc<RouterState>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        state.dispatcher.set_router_port(port);
        info!(port, "Router listening");
        Ok(Self {
            listener,
            state,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &Arc<RouterState> {
        &self.state
    }

    /// Accept connections until `shutdown` fires.
    pub async fn serve(self, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Router accept failed");
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let mut conn = FrameConn::new(stream);
                if let Err(e) = handler::handle(&state, &mut conn).await {
                    debug!(%peer, error = %e, "Router connection ended with error");
                }
            });
        }
        info!(port = self.port, "Router stopped");
    }
}
