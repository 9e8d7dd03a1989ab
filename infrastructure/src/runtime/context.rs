//! Per-request handle passed to tool functions and widget callbacks.
//!
//! Tool code runs on a blocking thread. Router round-trips go through the
//! runtime handle, so tool functions stay plain synchronous Rust.

use super::error::{Result, ToolError};
use super::layout::NodeId;
use super::storage::{InstanceHandle, StorageCoalescer};
use crate::router::{RouterClient, RouterClientError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tooldesk_domain::{
    BuildReply, Command, Interruption, LlmCompletion, MsgId, ScrollH, ScrollV, StorageFormat, Uid,
    default_instance_path,
};
use tracing::debug;

/// Minimum spacing between two progress round-trips of one request.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub struct ToolContext {
    handle: Handle,
    router: RouterClient,
    app_name: String,
    msg_id: MsgId,
    ui_uid: Uid,
    storage: Arc<StorageCoalescer>,
    commands: Vec<Command>,
    last_progress: Option<Instant>,
    stopped: bool,
}

impl ToolContext {
    pub(crate) fn new(
        handle: Handle,
        router: RouterClient,
        app_name: impl Into<String>,
        msg_id: MsgId,
        ui_uid: Uid,
        storage: Arc<StorageCoalescer>,
    ) -> Self {
        Self {
            handle,
            router,
            app_name: app_name.into(),
            msg_id,
            ui_uid,
            storage,
            commands: Vec::new(),
            last_progress: None,
            stopped: false,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn msg_id(&self) -> MsgId {
        self.msg_id
    }

    pub fn ui_uid(&self) -> Uid {
        self.ui_uid
    }

    pub fn router(&self) -> &RouterClient {
        &self.router
    }

    /// Drive a future to completion from tool code.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Report progress and learn whether the request was stopped.
    ///
    /// Calls closer than [`PROGRESS_INTERVAL`] to the previous report are
    /// answered locally. A stop, or a router that cannot be reached,
    /// returns [`ToolError::Interrupted`].
    pub fn progress(&mut self, done: f64, label: &str) -> Result<()> {
        if self.stopped {
            return Err(ToolError::interrupted());
        }
        if self.msg_id.is_none() {
            return Ok(());
        }
        let now = Instant::now();
        if let Some(last) = self.last_progress
            && now.duration_since(last) < PROGRESS_INTERVAL
        {
            return Ok(());
        }
        self.last_progress = Some(now);

        let stop = match self.block_on(self.router.progress(self.msg_id, done, label)) {
            Ok(stop) => stop,
            Err(e) => {
                debug!(msg_id = %self.msg_id, error = %e, "progress failed, treating as stop");
                true
            }
        };
        if stop {
            self.stopped = true;
            return Err(ToolError::interrupted());
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn add_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn open_centered(&mut self, dialog: NodeId) {
        self.add_command(Command::open_centered(dialog.uid()));
    }

    pub fn open_relative(&mut self, dialog: NodeId, anchor: NodeId) {
        self.add_command(Command::open_relative(dialog.uid(), anchor.uid()));
    }

    pub fn close_dialog(&mut self, dialog: NodeId) {
        self.add_command(Command::CloseDialog {
            ui_id: dialog.uid(),
        });
    }

    pub fn activate_editbox(&mut self, name: &str) {
        self.add_command(Command::ActivateEditbox {
            name: name.to_string(),
        });
    }

    pub fn scroll_v(&mut self, target: NodeId, to: ScrollV) {
        self.add_command(Command::ScrollV {
            target_id: target.uid(),
            to,
        });
    }

    pub fn scroll_h(&mut self, target: NodeId, to: ScrollH) {
        self.add_command(Command::ScrollH {
            target_id: target.uid(),
            to,
        });
    }

    pub fn set_clipboard(&mut self, text: &str) {
        self.add_command(Command::SetClipboard {
            text: text.to_string(),
        });
    }

    pub(crate) fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    fn flush_commands(&mut self) -> Result<()> {
        if self.commands.is_empty() || self.msg_id.is_none() {
            return Ok(());
        }
        let commands = self.take_commands();
        self.block_on(self.router.add_cmds(self.msg_id, &commands))?;
        Ok(())
    }

    /// Run `function` of `tool_name` through the router.
    ///
    /// Pending commands are flushed first so they precede the callee's in
    /// the session buffer.
    pub fn sub_call<T: Serialize>(
        &mut self,
        tool_name: &str,
        function: &str,
        params: &T,
    ) -> Result<BuildReply> {
        self.flush_commands()?;
        let params_json = serde_json::to_string(params)?;
        let reply = self.block_on(self.router.sub_call(
            self.msg_id,
            self.ui_uid,
            tool_name,
            function,
            &params_json,
        ));
        match reply {
            Ok(reply) => Ok(reply),
            Err(RouterClientError::Remote(text)) if Interruption::from_error_text(&text).is_some() => {
                self.stopped = true;
                Err(ToolError::interrupted())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`sub_call`](Self::sub_call) but decodes the callee's output
    /// record.
    pub fn call<T: Serialize, R: DeserializeOwned>(
        &mut self,
        tool_name: &str,
        function: &str,
        params: &T,
    ) -> Result<R> {
        let reply = self.sub_call(tool_name, function, params)?;
        Ok(serde_json::from_str(&reply.params_json)?)
    }

    /// Run a completion; the partial transcript is lost on failure.
    pub fn llm_complete(&mut self, completion: &LlmCompletion) -> Result<LlmCompletion> {
        let (completion, err) = self.block_on(self.router.llm_complete(self.msg_id, completion))?;
        match err {
            Some(text) if Interruption::from_error_text(&text).is_some() => {
                Err(ToolError::interrupted())
            }
            Some(text) => Err(ToolError::Message(text)),
            None => Ok(completion),
        }
    }

    /// Name the current session so others can find or stop it.
    pub fn set_session_name(&self, name: &str) -> Result<()> {
        self.block_on(self.router.set_msg_name(self.msg_id, name))?;
        Ok(())
    }

    /// Send text to the host log.
    pub fn print(&self, text: &str) {
        let _ = self.block_on(self.router.print(&self.app_name, text));
    }

    /// Load (and cache) the instance stored at `path`, saving it after the
    /// request when it changed.
    pub fn load_instance<T>(&self, path: &str, format: StorageFormat) -> Result<InstanceHandle<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        Ok(self.block_on(self.storage.load::<T>(path, format, true))?)
    }

    /// Load an instance that is never written back.
    pub fn read_instance<T>(&self, path: &str, format: StorageFormat) -> Result<InstanceHandle<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        Ok(self.block_on(self.storage.load::<T>(path, format, false))?)
    }

    /// [`load_instance`](Self::load_instance) at `<Struct>-<Struct>.json`.
    pub fn load_default<T>(&self) -> Result<InstanceHandle<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
    {
        let path = default_instance_path(std::any::type_name::<T>(), StorageFormat::Json);
        self.load_instance(&path, StorageFormat::Json)
    }
}
