//! Tool dispatch use case (host half of the router).
//!
//! Resolves a tool name to a live endpoint (spawning the tool lazily when
//! the corpus has it), opens a session for the request, forwards it through
//! the [`ToolTransport`] port, and merges the session's command buffer into
//! the reply.
//!
//! # Command ordering
//!
//! A tool flushes its own pending commands with `add_cmds` before issuing a
//! `sub_call`. The sub-call's commands are appended to the same session
//! buffer when it completes, and whatever the tool emits afterwards travels
//! in its reply. Replies therefore carry `session buffer ++ reply commands`.

use crate::config::DispatchParams;
use crate::ports::app_catalog::{AppCatalog, CatalogError};
use crate::ports::tool_launcher::ToolLauncher;
use crate::ports::tool_transport::{BuildRequest, ToolTransport, TransportError};
use crate::registry::{EndpointRegistry, SessionRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tooldesk_domain::{
    BuildReply, ChangeReply, Endpoint, GridCoord, MsgId, ToolSchema, Uid, UpdateReply,
};
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("tool_not_found: {0}")]
    ToolNotFound(String),

    #[error("tool_unreachable: {0}")]
    ToolUnreachable(String),

    /// Error text produced by the tool, passed through verbatim.
    #[error("{0}")]
    Tool(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to launch {0}")]
    Launch(String),

    #[error("{0}")]
    Catalog(String),
}

impl From<CatalogError> for DispatchError {
    fn from(e: CatalogError) -> Self {
        DispatchError::Catalog(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

pub struct ToolDispatcher {
    endpoints: Arc<EndpointRegistry>,
    sessions: Arc<SessionRegistry>,
    transport: Arc<dyn ToolTransport>,
    launcher: Arc<dyn ToolLauncher>,
    catalog: Arc<dyn AppCatalog>,
    params: DispatchParams,
    router_port: AtomicU16,
    storage_epochs: Mutex<HashMap<String, u64>>,
    /// One lock per tool name: a lazily spawned tool is launched once.
    launch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ToolDispatcher {
    pub fn new(
        endpoints: Arc<EndpointRegistry>,
        sessions: Arc<SessionRegistry>,
        transport: Arc<dyn ToolTransport>,
        launcher: Arc<dyn ToolLauncher>,
        catalog: Arc<dyn AppCatalog>,
        params: DispatchParams,
    ) -> Self {
        Self {
            endpoints,
            sessions,
            transport,
            launcher,
            catalog,
            params,
            router_port: AtomicU16::new(0),
            storage_epochs: Mutex::new(HashMap::new()),
            launch_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn catalog(&self) -> &Arc<dyn AppCatalog> {
        &self.catalog
    }

    /// Port handed to lazily spawned tools. Set once the listener is bound.
    pub fn set_router_port(&self, port: u16) {
        self.router_port.store(port, Ordering::Relaxed);
    }

    pub fn register(&self, tool_name: &str, port: u16) {
        self.endpoints.register(tool_name, port);
    }

    fn launch_lock(&self, tool_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.launch_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tool_name.to_string())
            .or_default()
            .clone()
    }

    async fn resolve(&self, tool_name: &str) -> Result<Endpoint> {
        if let Some(ep) = self.endpoints.get(tool_name) {
            return Ok(ep);
        }
        let lock = self.launch_lock(tool_name);
        let _launching = lock.lock().await;
        // Registered while this request waited behind another launch.
        if let Some(ep) = self.endpoints.get(tool_name) {
            return Ok(ep);
        }
        let port = self.router_port.load(Ordering::Relaxed);
        let launched = self.launcher.launch(tool_name, port).map_err(|e| {
            warn!(tool = tool_name, error = %e, "Tool launch failed");
            DispatchError::Launch(tool_name.to_string())
        })?;
        if !launched {
            return Err(DispatchError::ToolNotFound(tool_name.to_string()));
        }
        info!(tool = tool_name, "Waiting for spawned tool to register");
        self.endpoints
            .wait_for(tool_name, self.params.spawn_timeout)
            .await
            .ok_or_else(|| DispatchError::ToolUnreachable(tool_name.to_string()))
    }

    fn transport_error(&self, endpoint: &Endpoint, err: TransportError) -> DispatchError {
        match err {
            TransportError::Unreachable(detail) => {
                warn!(tool = %endpoint.tool_name, port = endpoint.port, %detail, "Tool unreachable");
                self.endpoints.mark_unreachable(endpoint);
                DispatchError::ToolUnreachable(endpoint.tool_name.clone())
            }
            TransportError::Remote(text) => DispatchError::Tool(text),
            TransportError::Protocol(detail) => DispatchError::Protocol(detail),
        }
    }

    async fn build_in_session(
        &self,
        parent: Option<MsgId>,
        tool_name: &str,
        ui_uid: Uid,
        function: &str,
        params_json: &str,
    ) -> Result<BuildReply> {
        let endpoint = self.resolve(tool_name).await?;
        let session = self.sessions.open(tool_name, parent);
        let request = BuildRequest {
            msg_id: session.id(),
            ui_uid,
            function: function.to_string(),
            params_json: params_json.to_string(),
        };
        debug!(msg_id = %session.id(), tool = tool_name, function, "build");
        let mut reply = self
            .transport
            .build(&endpoint, &request)
            .await
            .map_err(|e| self.transport_error(&endpoint, e))?;
        let mut commands = session.take_cmds();
        commands.append(&mut reply.commands);
        reply.commands = commands;
        Ok(reply)
    }

    /// Host `build`: run `function` of `tool_name` with a fresh UI root.
    pub async fn build(
        &self,
        tool_name: &str,
        ui_uid: Uid,
        function: &str,
        params_json: &str,
    ) -> Result<BuildReply> {
        self.build_in_session(None, tool_name, ui_uid, function, params_json)
            .await
    }

    /// Host `change`: replay a change event on a cached UI root.
    pub async fn change(
        &self,
        tool_name: &str,
        ui_uid: Uid,
        change_json: &str,
    ) -> Result<ChangeReply> {
        let endpoint = self.resolve(tool_name).await?;
        let session = self.sessions.open(tool_name, None);
        debug!(msg_id = %session.id(), tool = tool_name, %ui_uid, "change");
        let mut reply = self
            .transport
            .change(&endpoint, session.id(), ui_uid, change_json)
            .await
            .map_err(|e| self.transport_error(&endpoint, e))?;
        let mut commands = session.take_cmds();
        commands.append(&mut reply.commands);
        reply.commands = commands;
        Ok(reply)
    }

    /// Host `update`: re-render the sub-tree rooted at `sub_uid`.
    pub async fn update(&self, tool_name: &str, ui_uid: Uid, sub_uid: Uid) -> Result<UpdateReply> {
        let endpoint = self.resolve(tool_name).await?;
        let session = self.sessions.open(tool_name, None);
        let mut reply = self
            .transport
            .update(&endpoint, session.id(), ui_uid, sub_uid)
            .await
            .map_err(|e| self.transport_error(&endpoint, e))?;
        let mut commands = session.take_cmds();
        commands.append(&mut reply.commands);
        reply.commands = commands;
        Ok(reply)
    }

    /// Tool → tool call funneled through the router.
    ///
    /// The child's commands are appended to the parent session's buffer and
    /// also returned to the caller.
    pub async fn sub_call(
        &self,
        parent: MsgId,
        parent_ui_uid: Uid,
        tool_name: &str,
        function: &str,
        params_json: &str,
    ) -> Result<BuildReply> {
        let ui_uid = parent_ui_uid.child(function, &GridCoord::default());
        let reply = self
            .build_in_session(Some(parent), tool_name, ui_uid, function, params_json)
            .await?;
        if !parent.is_none()
            && let Err(e) = self.sessions.add_cmds(parent, reply.commands.clone())
        {
            debug!(msg_id = %parent, error = %e, "Parent session gone; commands not merged");
        }
        Ok(reply)
    }

    /// Call the app implementing LLM function `function`.
    pub async fn call_function(
        &self,
        parent: MsgId,
        function: &str,
        params_json: &str,
    ) -> Result<BuildReply> {
        let schema = self
            .catalog
            .find_function(function)
            .ok_or_else(|| DispatchError::ToolNotFound(function.to_string()))?;
        self.sub_call(parent, Uid::default(), &schema.app, function, params_json)
            .await
    }

    /// Schemas the LLM may use for `app` (all apps when empty).
    pub fn tool_schemas(&self, app: &str) -> Vec<ToolSchema> {
        self.catalog.schemas(app)
    }

    /// Broadcast that files of `tool_name` changed. Returns the new epoch.
    pub async fn storage_changed(&self, tool_name: &str) -> u64 {
        let epoch = {
            let mut epochs = self.storage_epochs.lock().unwrap_or_else(|e| e.into_inner());
            let epoch = epochs.entry(tool_name.to_string()).or_insert(0);
            *epoch += 1;
            *epoch
        };
        let peers: Vec<Endpoint> = self
            .endpoints
            .list()
            .into_iter()
            .filter(|ep| ep.tool_name != tool_name)
            .collect();
        debug!(tool = tool_name, epoch, peers = peers.len(), "storage_changed broadcast");

        let sends = peers.iter().map(|ep| async move {
            (ep, self.transport.storage_changed(ep, tool_name).await)
        });
        for (ep, result) in futures::future::join_all(sends).await {
            if let Err(e) = result {
                let _ = self.transport_error(ep, e);
            }
        }
        epoch
    }

    pub fn storage_epoch(&self, tool_name: &str) -> u64 {
        self.storage_epochs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool_name)
            .copied()
            .unwrap_or(0)
    }

    /// Ask a registered tool to exit and forget its endpoint.
    pub async fn exit_tool(&self, tool_name: &str) -> bool {
        let Some(endpoint) = self.endpoints.remove(tool_name) else {
            return false;
        };
        if let Err(e) = self.transport.exit(&endpoint).await {
            debug!(tool = tool_name, error = %e, "exit not delivered");
        }
        true
    }

    pub async fn generate_app(&self, name: &str) -> Result<()> {
        self.catalog.generate_app(name)?;
        info!(app = name, "App generated");
        Ok(())
    }

    pub async fn rename_app(&self, old: &str, new: &str) -> Result<()> {
        self.exit_tool(old).await;
        self.catalog.rename_app(old, new)?;
        info!(from = old, to = new, "App renamed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ports::app_catalog::EmptyCatalog;
    use crate::ports::tool_launcher::{LaunchError, NoLauncher};
    use async_trait::async_trait;
    use tooldesk_domain::Command;

    /// Scripted transport: replies per function name and records calls.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub replies: Mutex<HashMap<String, std::result::Result<BuildReply, TransportError>>>,
        pub calls: Mutex<Vec<String>>,
        pub sessions: Mutex<Option<Arc<SessionRegistry>>>,
        /// Commands the fake "tool" flushes to its session before replying.
        pub flushed: Mutex<Vec<Command>>,
        /// Behave like a long loop: poll `progress` for up to 2 s.
        pub polls_progress: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ToolTransport for FakeTransport {
        async fn build(
            &self,
            endpoint: &Endpoint,
            request: &BuildRequest,
        ) -> std::result::Result<BuildReply, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}.{}", endpoint.tool_name, request.function));
            let flushed: Vec<Command> = self.flushed.lock().unwrap().drain(..).collect();
            let sessions = self.sessions.lock().unwrap().clone();
            if let Some(sessions) = &sessions {
                sessions.add_cmds(request.msg_id, flushed).unwrap();
            }
            if self.polls_progress.load(std::sync::atomic::Ordering::Relaxed)
                && let Some(sessions) = &sessions
            {
                for i in 0..40 {
                    if sessions.progress(request.msg_id, i as f64 / 40.0, "loop") {
                        return Err(TransportError::Remote("_interrupted_".to_string()));
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                return Ok(BuildReply {
                    params_json: r#"{"Out_Stat":"finished"}"#.to_string(),
                    ..BuildReply::default()
                });
            }
            self.replies
                .lock()
                .unwrap()
                .get(&request.function)
                .cloned()
                .unwrap_or_else(|| Ok(BuildReply::default()))
        }

        async fn change(
            &self,
            _endpoint: &Endpoint,
            _msg_id: MsgId,
            _ui_uid: Uid,
            _change_json: &str,
        ) -> std::result::Result<ChangeReply, TransportError> {
            Ok(ChangeReply {
                params_json: "{}".to_string(),
                commands: vec![Command::open_centered(Uid(5))],
            })
        }

        async fn update(
            &self,
            _endpoint: &Endpoint,
            _msg_id: MsgId,
            _ui_uid: Uid,
            _sub_uid: Uid,
        ) -> std::result::Result<UpdateReply, TransportError> {
            Ok(UpdateReply::default())
        }

        async fn storage_changed(
            &self,
            endpoint: &Endpoint,
            tool_name: &str,
        ) -> std::result::Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("storage_changed:{}<-{}", endpoint.tool_name, tool_name));
            Ok(())
        }

        async fn exit(&self, endpoint: &Endpoint) -> std::result::Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("exit:{}", endpoint.tool_name));
            Ok(())
        }
    }

    pub(crate) fn dispatcher(transport: Arc<FakeTransport>) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::new(EndpointRegistry::new()),
            SessionRegistry::new(),
            transport,
            Arc::new(NoLauncher),
            Arc::new(EmptyCatalog),
            DispatchParams::default(),
        )
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let d = dispatcher(Arc::new(FakeTransport::default()));
        let err = d.build("Nope", Uid(1), "F", "{}").await.unwrap_err();
        assert_eq!(err, DispatchError::ToolNotFound("Nope".to_string()));
        assert_eq!(err.to_string(), "tool_not_found: Nope");
    }

    #[tokio::test]
    async fn unreachable_tool_is_dropped() {
        let transport = Arc::new(FakeTransport::default());
        transport.replies.lock().unwrap().insert(
            "F".to_string(),
            Err(TransportError::Unreachable("refused".to_string())),
        );
        let d = dispatcher(transport);
        d.register("Calendar", 9);
        let err = d.build("Calendar", Uid(1), "F", "{}").await.unwrap_err();
        assert_eq!(err, DispatchError::ToolUnreachable("Calendar".to_string()));
        assert!(d.endpoints().get("Calendar").is_none());
    }

    #[tokio::test]
    async fn tool_error_text_passes_through() {
        let transport = Arc::new(FakeTransport::default());
        transport.replies.lock().unwrap().insert(
            "F".to_string(),
            Err(TransportError::Remote("_interrupted_".to_string())),
        );
        let d = dispatcher(transport);
        d.register("Calendar", 9);
        let err = d.build("Calendar", Uid(1), "F", "{}").await.unwrap_err();
        assert_eq!(err.to_string(), "_interrupted_");
        assert!(d.sessions().is_empty());
    }

    #[tokio::test]
    async fn sub_call_merges_commands_into_parent() {
        let transport = Arc::new(FakeTransport::default());
        let d = dispatcher(transport.clone());
        *transport.sessions.lock().unwrap() = Some(d.sessions().clone());
        transport.flushed.lock().unwrap().push(Command::open_centered(Uid(2)));
        transport.replies.lock().unwrap().insert(
            "Child".to_string(),
            Ok(BuildReply {
                params_json: "{}".to_string(),
                ui_json: String::new(),
                commands: vec![Command::open_centered(Uid(3))],
            }),
        );
        d.register("Other", 10);

        let parent = d.sessions().open("Caller", None);
        d.sessions()
            .add_cmds(parent.id(), vec![Command::open_centered(Uid(1))])
            .unwrap();
        let reply = d
            .sub_call(parent.id(), Uid(7), "Other", "Child", "{}")
            .await
            .unwrap();
        assert_eq!(
            reply.commands,
            vec![Command::open_centered(Uid(2)), Command::open_centered(Uid(3))]
        );
        assert_eq!(
            parent.take_cmds(),
            vec![
                Command::open_centered(Uid(1)),
                Command::open_centered(Uid(2)),
                Command::open_centered(Uid(3)),
            ]
        );
    }

    #[tokio::test]
    async fn change_prepends_session_buffer() {
        let d = dispatcher(Arc::new(FakeTransport::default()));
        d.register("Calendar", 9);
        let reply = d.change("Calendar", Uid(1), "{}").await.unwrap();
        assert_eq!(reply.commands, vec![Command::open_centered(Uid(5))]);
    }

    #[tokio::test]
    async fn storage_changed_skips_origin_and_bumps_epoch() {
        let transport = Arc::new(FakeTransport::default());
        let d = dispatcher(transport.clone());
        d.register("A", 1);
        d.register("B", 2);
        d.register("C", 3);
        assert_eq!(d.storage_changed("A").await, 1);
        assert_eq!(d.storage_changed("A").await, 2);
        assert_eq!(d.storage_epoch("B"), 0);
        let calls = transport.calls.lock().unwrap().clone();
        assert!(calls.contains(&"storage_changed:B<-A".to_string()));
        assert!(calls.contains(&"storage_changed:C<-A".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("storage_changed:A")));
    }

    #[derive(Default)]
    struct CountingLauncher {
        launches: std::sync::atomic::AtomicUsize,
    }

    impl ToolLauncher for CountingLauncher {
        fn launch(&self, app: &str, _router_port: u16) -> std::result::Result<bool, LaunchError> {
            self.launches.fetch_add(1, Ordering::Relaxed);
            Ok(app == "Lazy")
        }
    }

    #[tokio::test]
    async fn lazy_spawn_waits_for_registration() {
        let d = Arc::new(ToolDispatcher::new(
            Arc::new(EndpointRegistry::new()),
            SessionRegistry::new(),
            Arc::new(FakeTransport::default()),
            Arc::new(CountingLauncher::default()),
            Arc::new(EmptyCatalog),
            DispatchParams::default().with_spawn_timeout(std::time::Duration::from_secs(5)),
        ));
        let registrar = {
            let d = d.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                d.register("Lazy", 4242);
            })
        };
        d.build("Lazy", Uid(1), "F", "{}").await.unwrap();
        registrar.await.unwrap();

        let short = ToolDispatcher::new(
            Arc::new(EndpointRegistry::new()),
            SessionRegistry::new(),
            Arc::new(FakeTransport::default()),
            Arc::new(CountingLauncher::default()),
            Arc::new(EmptyCatalog),
            DispatchParams::default().with_spawn_timeout(std::time::Duration::from_millis(20)),
        );
        assert_eq!(
            short.build("Lazy", Uid(1), "F", "{}").await.unwrap_err(),
            DispatchError::ToolUnreachable("Lazy".to_string())
        );
    }

    #[tokio::test]
    async fn concurrent_requests_launch_once() {
        let launcher = Arc::new(CountingLauncher::default());
        let d = Arc::new(ToolDispatcher::new(
            Arc::new(EndpointRegistry::new()),
            SessionRegistry::new(),
            Arc::new(FakeTransport::default()),
            launcher.clone(),
            Arc::new(EmptyCatalog),
            DispatchParams::default().with_spawn_timeout(std::time::Duration::from_secs(5)),
        ));
        let registrar = {
            let d = d.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                d.register("Lazy", 4242);
            })
        };
        let (a, b) = tokio::join!(
            d.build("Lazy", Uid(1), "F", "{}"),
            d.build("Lazy", Uid(2), "F", "{}")
        );
        registrar.await.unwrap();
        a.unwrap();
        b.unwrap();
        assert_eq!(launcher.launches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn rename_sends_exit_first() {
        let transport = Arc::new(FakeTransport::default());
        let d = dispatcher(transport.clone());
        d.register("Old", 1);
        // EmptyCatalog has no apps, so the rename itself fails.
        assert!(d.rename_app("Old", "New").await.is_err());
        assert_eq!(*transport.calls.lock().unwrap(), vec!["exit:Old".to_string()]);
        assert!(d.endpoints().get("Old").is_none());
    }
}
