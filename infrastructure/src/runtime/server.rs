//! Tool process runtime: listener, registration and request dispatch.

use super::context::ToolContext;
use super::error::RuntimeError;
use super::function::{ToolSet, UiRegistry};
use super::storage::{StorageBackend, StorageCoalescer};
use crate::router::RouterClient;
use crate::router::handler::{write_build_reply, write_change_reply, write_update_reply};
use crate::wire::{self, FrameConn};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tooldesk_domain::{BuildReply, ChangeEvent, ChangeReply, Interruption, MsgId, Uid, UpdateReply};
use tracing::{debug, info, warn};

/// Listen ports are probed from `router_port + PORT_OFFSET` upward.
pub const PORT_OFFSET: u32 = 100;
pub const PORT_ATTEMPTS: u32 = 1000;

struct Inner {
    app_name: String,
    router: RouterClient,
    tools: ToolSet,
    roots: UiRegistry,
    storage: Arc<StorageCoalescer>,
    shutdown: CancellationToken,
}

pub struct ToolRuntime {
    inner: Arc<Inner>,
    listener: TcpListener,
    port: u16,
}

impl ToolRuntime {
    /// Bind the first free port in `router_port + 100 + k`, `k < 1000`.
    pub async fn bind(
        app_name: &str,
        router_port: u16,
        tools: ToolSet,
    ) -> Result<Self, RuntimeError> {
        let first = u32::from(router_port) + PORT_OFFSET;
        let last = first + PORT_ATTEMPTS;
        let mut bound = None;
        for candidate in first..last {
            let Ok(port) = u16::try_from(candidate) else {
                break;
            };
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    bound = Some((listener, port));
                    break;
                }
                Err(e) => debug!(port, error = %e, "port busy"),
            }
        }
        let (listener, port) = bound.ok_or(RuntimeError::NoFreePort { first, last })?;

        let router = RouterClient::new(router_port);
        let storage = Arc::new(StorageCoalescer::new(
            app_name,
            Arc::new(router) as Arc<dyn StorageBackend>,
        ));
        info!(app = app_name, port, router_port, "Tool listening");
        Ok(Self {
            inner: Arc::new(Inner {
                app_name: app_name.to_string(),
                router,
                tools,
                roots: UiRegistry::default(),
                storage,
                shutdown: CancellationToken::new(),
            }),
            listener,
            port,
        })
    }

    /// Parse `<app_name> <router_port>` from the process arguments.
    pub fn parse_args<I>(args: I) -> Result<(String, u16), RuntimeError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter().skip(1);
        let (Some(app_name), Some(port)) = (args.next(), args.next()) else {
            return Err(RuntimeError::Usage);
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| RuntimeError::InvalidPort(port.clone()))?;
        Ok((app_name, port))
    }

    /// Entry point for tool binaries: parse arguments, bind, register and
    /// serve until the router sends `exit`.
    pub async fn run_from_args(tools: ToolSet) -> Result<(), RuntimeError> {
        let (app_name, router_port) = Self::parse_args(std::env::args())?;
        let runtime = Self::bind(&app_name, router_port, tools).await?;
        runtime.register().await?;
        runtime.serve().await;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    /// Token cancelled by `exit`; cancel it to stop [`serve`](Self::serve).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub async fn register(&self) -> Result<(), RuntimeError> {
        self.inner
            .router
            .register(&self.inner.app_name, self.port)
            .await
            .map_err(RuntimeError::Register)
    }

    /// Accept requests until `exit`.
    pub async fn serve(self) {
        let shutdown = self.inner.shutdown.clone();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let stream = match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(app = %self.inner.app_name, error = %e, "accept failed");
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let mut conn = FrameConn::new(stream);
                if let Err(e) = inner.handle(&mut conn).await {
                    debug!(app = %inner.app_name, error = %e, "tool connection ended with error");
                }
            });
        }
        info!(app = %self.inner.app_name, "Tool stopped");
    }
}

impl Inner {
    async fn handle<S>(self: &Arc<Self>, conn: &mut FrameConn<S>) -> wire::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let command = conn.read_string().await?;
        match command.as_str() {
            "exit" => {
                info!(app = %self.app_name, "exit requested");
                self.shutdown.cancel();
                return Ok(());
            }
            "storage_changed" => {
                let owner = conn.read_string().await?;
                let dropped = self.storage.invalidate_clean();
                debug!(app = %self.app_name, owner = %owner, dropped, "storage invalidated");
                return Ok(());
            }
            "build" => {
                let msg_id = MsgId(conn.read_u64().await?);
                let ui_uid = Uid(conn.read_u64().await?);
                let function = conn.read_string().await?;
                let params_json = conn.read_string().await?;
                let result = self.build(msg_id, ui_uid, function, params_json).await;
                write_build_reply(conn, result).await?;
            }
            "change" => {
                let msg_id = MsgId(conn.read_u64().await?);
                let ui_uid = Uid(conn.read_u64().await?);
                let change_json = conn.read_string().await?;
                let result = self.change(msg_id, ui_uid, change_json).await;
                write_change_reply(conn, result).await?;
            }
            "update" => {
                let msg_id = MsgId(conn.read_u64().await?);
                let ui_uid = Uid(conn.read_u64().await?);
                let sub_uid = Uid(conn.read_u64().await?);
                let result = self.update(msg_id, ui_uid, sub_uid).await;
                write_update_reply(conn, result).await?;
            }
            other => {
                warn!(app = %self.app_name, command = %other, "Unknown tool command");
                conn.write_str(&format!("unknown command: {}", other)).await?;
            }
        }
        conn.flush().await
    }

    fn context(&self, msg_id: MsgId, ui_uid: Uid) -> ToolContext {
        ToolContext::new(
            Handle::current(),
            self.router,
            self.app_name.clone(),
            msg_id,
            ui_uid,
            Arc::clone(&self.storage),
        )
    }

    async fn build(
        self: &Arc<Self>,
        msg_id: MsgId,
        ui_uid: Uid,
        function: String,
        params_json: String,
    ) -> Result<BuildReply, String> {
        debug!(app = %self.app_name, %msg_id, %ui_uid, function = %function, "build");
        let inner = Arc::clone(self);
        let mut ctx = self.context(msg_id, ui_uid);
        let (result, commands, function, params_json) = tokio::task::spawn_blocking(move || {
            let result = inner.tools.build(&mut ctx, &function, ui_uid, &params_json);
            (result, ctx.take_commands(), function, params_json)
        })
        .await
        .map_err(|e| format!("tool task failed: {}", e))?;

        match result {
            Ok(built) => {
                self.roots.insert(ui_uid, built.root);
                self.storage.flush().await;
                Ok(BuildReply {
                    params_json: built.params_json,
                    ui_json: built.ui_json,
                    commands,
                })
            }
            Err(e) => Err(e.to_error_text(Interruption::Request, &function, &params_json)),
        }
    }

    async fn change(
        self: &Arc<Self>,
        msg_id: MsgId,
        ui_uid: Uid,
        change_json: String,
    ) -> Result<ChangeReply, String> {
        let root = self
            .roots
            .get(ui_uid)
            .ok_or_else(|| format!("UI root not found: {}", ui_uid))?;
        let mut ctx = self.context(msg_id, ui_uid);
        let (result, commands) = tokio::task::spawn_blocking(move || {
            let mut root = root.lock().unwrap_or_else(|e| e.into_inner());
            let result = match serde_json::from_str::<ChangeEvent>(&change_json) {
                Ok(event) => root
                    .change(&mut ctx, &event)
                    .and_then(|()| root.params_json())
                    .map_err(|e| e.to_error_text(Interruption::Change, root.function(), &change_json)),
                Err(e) => Err(format!("Invalid change event: {}", e)),
            };
            (result, ctx.take_commands())
        })
        .await
        .map_err(|e| format!("tool task failed: {}", e))?;

        let params_json = result?;
        self.storage.flush().await;
        Ok(ChangeReply {
            params_json,
            commands,
        })
    }

    async fn update(
        self: &Arc<Self>,
        msg_id: MsgId,
        ui_uid: Uid,
        sub_uid: Uid,
    ) -> Result<UpdateReply, String> {
        let root = self
            .roots
            .get(ui_uid)
            .ok_or_else(|| format!("UI root not found: {}", ui_uid))?;
        let mut ctx = self.context(msg_id, ui_uid);
        let (result, commands) = tokio::task::spawn_blocking(move || {
            let mut root = root.lock().unwrap_or_else(|e| e.into_inner());
            let result = root.update(&mut ctx, sub_uid).map_err(|e| {
                e.to_error_text(Interruption::Request, root.function(), &sub_uid.to_string())
            });
            (result, ctx.take_commands())
        })
        .await
        .map_err(|e| format!("tool task failed: {}", e))?;

        let ui_json = result?;
        self.storage.flush().await;
        debug!(app = %self.app_name, roots = self.roots.len(), "update done");
        Ok(UpdateReply { ui_json, commands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn arguments_are_app_name_then_router_port() {
        let parsed = ToolRuntime::parse_args(args(&["calendar", "Calendar", "8000"])).unwrap();
        assert_eq!(parsed, ("Calendar".to_string(), 8000));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(matches!(
            ToolRuntime::parse_args(args(&["calendar", "Calendar"])),
            Err(RuntimeError::Usage)
        ));
        assert!(matches!(
            ToolRuntime::parse_args(args(&["calendar", "Calendar", "http"])),
            Err(RuntimeError::InvalidPort(_))
        ));
    }

    #[tokio::test]
    async fn listener_skips_busy_ports() {
        let router = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router_port = router.local_addr().unwrap().port();
        if u32::from(router_port) + PORT_OFFSET + 2 > u32::from(u16::MAX) {
            return;
        }
        let first = ToolRuntime::bind("A", router_port, ToolSet::new()).await.unwrap();
        let second = ToolRuntime::bind("B", router_port, ToolSet::new()).await.unwrap();
        assert!(u32::from(first.port()) >= u32::from(router_port) + PORT_OFFSET);
        assert_ne!(first.port(), second.port());
    }
}
