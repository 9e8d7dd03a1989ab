//! Client side of the router protocol.
//!
//! Used by tool processes (progress, storage, sub-calls) and by the CLI.
//! Every call dials a fresh loopback connection, writes one command and
//! reads its reply.

use crate::wire::{FrameConn, WireError};
use thiserror::Error;
use tooldesk_domain::{
    BuildReply, ChangeEvent, ChangeReply, Command, CompletionSnapshot, LlmCompletion, MsgId,
    MsgInfo, ToolSchema, TranscribeRequest, Uid, UpdateReply, commands_from_json,
    progress_to_wire,
};
use tracing::trace;

#[derive(Error, Debug)]
pub enum RouterClientError {
    #[error(transparent)]
    Wire(#[from] WireError),

    /// `error_text` returned by the router, verbatim.
    #[error("{0}")]
    Remote(String),
}

impl From<serde_json::Error> for RouterClientError {
    fn from(e: serde_json::Error) -> Self {
        RouterClientError::Wire(WireError::Json(e))
    }
}

pub type Result<T> = std::result::Result<T, RouterClientError>;

#[derive(Debug, Clone, Copy)]
pub struct RouterClient {
    port: u16,
}

impl RouterClient {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn open(&self, command: &str) -> Result<FrameConn<tokio::net::TcpStream>> {
        trace!(command, port = self.port, "router call");
        let mut conn = FrameConn::connect(self.port).await?;
        conn.write_str(command).await?;
        Ok(conn)
    }

    async fn read_error(conn: &mut FrameConn<tokio::net::TcpStream>) -> Result<Option<String>> {
        let text = conn.read_string().await?;
        Ok((!text.is_empty()).then_some(text))
    }

    /// Read the error frame and fail when it is non-empty.
    async fn expect_ok(conn: &mut FrameConn<tokio::net::TcpStream>) -> Result<()> {
        match Self::read_error(conn).await? {
            Some(text) => Err(RouterClientError::Remote(text)),
            None => Ok(()),
        }
    }

    pub async fn register(&self, tool_name: &str, port: u16) -> Result<()> {
        let mut conn = self.open("register").await?;
        conn.write_str(tool_name).await?;
        conn.write_u64(u64::from(port)).await?;
        conn.flush().await?;
        Ok(())
    }

    pub async fn print(&self, tool_name: &str, text: &str) -> Result<()> {
        let mut conn = self.open("print").await?;
        conn.write_str(tool_name).await?;
        conn.write_str(text).await?;
        conn.flush().await?;
        Ok(())
    }

    /// Announce that files owned by `tool_name` changed. Returns once the
    /// router has forwarded the invalidation to every other tool.
    pub async fn storage_changed(&self, tool_name: &str) -> Result<()> {
        let mut conn = self.open("storage_changed").await?;
        conn.write_str(tool_name).await?;
        conn.flush().await?;
        conn.wait_closed().await?;
        Ok(())
    }

    /// `Ok(None)` when the file does not exist.
    pub async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.open("read_file").await?;
        conn.write_str(path).await?;
        conn.flush().await?;
        let err = Self::read_error(&mut conn).await?;
        let exists = conn.read_bool().await?;
        let bytes = conn.read_bytes().await?;
        if let Some(text) = err {
            return Err(RouterClientError::Remote(text));
        }
        Ok(exists.then_some(bytes))
    }

    pub async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut conn = self.open("write_file").await?;
        conn.write_str(path).await?;
        conn.write_bytes(bytes).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    /// Report progress; returns `true` when the session should stop.
    pub async fn progress(&self, msg_id: MsgId, done: f64, label: &str) -> Result<bool> {
        let mut conn = self.open("progress").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_u64(progress_to_wire(done)).await?;
        conn.write_str(label).await?;
        conn.flush().await?;
        Ok(conn.read_bool().await?)
    }

    pub async fn add_cmds(&self, msg_id: MsgId, commands: &[Command]) -> Result<()> {
        let mut conn = self.open("add_cmds").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_json(commands).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    pub async fn get_msgs(&self) -> Result<Vec<MsgInfo>> {
        let mut conn = self.open("get_msgs").await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await?;
        Ok(conn.read_json().await?)
    }

    /// Stop by decimal id or display name.
    pub async fn stop_msg_name(&self, name: &str) -> Result<()> {
        let mut conn = self.open("stop_msg_name").await?;
        conn.write_str(name).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    pub async fn set_msg_name(&self, msg_id: MsgId, name: &str) -> Result<()> {
        let mut conn = self.open("set_msg_name").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_str(name).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    pub async fn find_msg_name(&self, name: &str) -> Result<Option<MsgInfo>> {
        let mut conn = self.open("find_msg_name").await?;
        conn.write_str(name).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await?;
        let found = conn.read_bool().await?;
        let bytes = conn.read_bytes().await?;
        if !found {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn get_tools_schemas(&self, app: &str) -> Result<Vec<ToolSchema>> {
        let mut conn = self.open("get_tools_shemas").await?;
        conn.write_str(app).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await?;
        Ok(conn.read_json().await?)
    }

    pub async fn sub_call(
        &self,
        parent: MsgId,
        parent_ui_uid: Uid,
        tool_name: &str,
        function: &str,
        params_json: &str,
    ) -> Result<BuildReply> {
        let mut conn = self.open("sub_call").await?;
        conn.write_u64(parent.as_u64()).await?;
        conn.write_u64(parent_ui_uid.as_u64()).await?;
        conn.write_str(tool_name).await?;
        conn.write_str(function).await?;
        conn.write_str(params_json).await?;
        conn.flush().await?;
        read_build_reply(&mut conn).await
    }

    /// Host API: `build` on a fresh UI root.
    pub async fn build(
        &self,
        tool_name: &str,
        ui_uid: Uid,
        function: &str,
        params_json: &str,
    ) -> Result<BuildReply> {
        let mut conn = self.open("build").await?;
        conn.write_str(tool_name).await?;
        conn.write_u64(ui_uid.as_u64()).await?;
        conn.write_str(function).await?;
        conn.write_str(params_json).await?;
        conn.flush().await?;
        read_build_reply(&mut conn).await
    }

    /// Host API: replay a change event.
    pub async fn change(&self, tool_name: &str, ui_uid: Uid, event: &ChangeEvent) -> Result<ChangeReply> {
        let mut conn = self.open("change").await?;
        conn.write_str(tool_name).await?;
        conn.write_u64(ui_uid.as_u64()).await?;
        conn.write_json(event).await?;
        conn.flush().await?;
        read_change_reply(&mut conn).await
    }

    /// Host API: partial refresh of `sub_uid`.
    pub async fn update(&self, tool_name: &str, ui_uid: Uid, sub_uid: Uid) -> Result<UpdateReply> {
        let mut conn = self.open("update").await?;
        conn.write_str(tool_name).await?;
        conn.write_u64(ui_uid.as_u64()).await?;
        conn.write_u64(sub_uid.as_u64()).await?;
        conn.flush().await?;
        read_update_reply(&mut conn).await
    }

    /// Run a completion to the end.
    ///
    /// On failure the router still returns the partial transcript; it is
    /// handed back together with the error text.
    pub async fn llm_complete(
        &self,
        msg_id: MsgId,
        completion: &LlmCompletion,
    ) -> Result<(LlmCompletion, Option<String>)> {
        let mut conn = self.open("llm_complete").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_json(completion).await?;
        conn.flush().await?;
        let err = Self::read_error(&mut conn).await?;
        let bytes = conn.read_bytes().await?;
        if bytes.is_empty() {
            return Err(RouterClientError::Remote(err.unwrap_or_default()));
        }
        Ok((serde_json::from_slice(&bytes)?, err))
    }

    pub async fn llm_find(&self, msg_id: MsgId, uid: &str) -> Result<Option<CompletionSnapshot>> {
        let mut conn = self.open("llm_find").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_str(uid).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await?;
        let found = conn.read_bool().await?;
        let bytes = conn.read_bytes().await?;
        if !found {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn llm_stop(&self, msg_id: MsgId, uid: &str) -> Result<()> {
        let mut conn = self.open("llm_stop").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_str(uid).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    pub async fn llm_transcribe(&self, msg_id: MsgId, request: &TranscribeRequest) -> Result<Vec<u8>> {
        let mut conn = self.open("llm_transcribe").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_json(request).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await?;
        Ok(conn.read_bytes().await?)
    }

    pub async fn start_microphone(&self, msg_id: MsgId, mic_uid: &str) -> Result<()> {
        let mut conn = self.open("start_microphone").await?;
        conn.write_u64(msg_id.as_u64()).await?;
        conn.write_str(mic_uid).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    pub async fn stop_microphone(&self, mic_uid: &str, cancel: bool, format: &str) -> Result<Vec<u8>> {
        let mut conn = self.open("stop_microphone").await?;
        conn.write_str(mic_uid).await?;
        conn.write_bool(cancel).await?;
        conn.write_str(format).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await?;
        Ok(conn.read_bytes().await?)
    }

    pub async fn generate_app(&self, name: &str) -> Result<()> {
        let mut conn = self.open("generate_app").await?;
        conn.write_str(name).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }

    pub async fn rename_app(&self, old: &str, new: &str) -> Result<()> {
        let mut conn = self.open("rename_app").await?;
        conn.write_str(old).await?;
        conn.write_str(new).await?;
        conn.flush().await?;
        Self::expect_ok(&mut conn).await
    }
}

/// `(error, params_out_json, ui_json, commands_json)`
pub(crate) async fn read_build_reply<S>(conn: &mut FrameConn<S>) -> Result<BuildReply>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let err = conn.read_string().await?;
    let params_json = conn.read_string().await?;
    let ui_json = conn.read_string().await?;
    let commands = conn.read_bytes().await?;
    if !err.is_empty() {
        return Err(RouterClientError::Remote(err));
    }
    Ok(BuildReply {
        params_json,
        ui_json,
        commands: decode_commands(&commands)?,
    })
}

/// `(error, params_out_json, commands_json)`
pub(crate) async fn read_change_reply<S>(conn: &mut FrameConn<S>) -> Result<ChangeReply>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let err = conn.read_string().await?;
    let params_json = conn.read_string().await?;
    let commands = conn.read_bytes().await?;
    if !err.is_empty() {
        return Err(RouterClientError::Remote(err));
    }
    Ok(ChangeReply {
        params_json,
        commands: decode_commands(&commands)?,
    })
}

/// `(error, sub_ui_json, commands_json)`
pub(crate) async fn read_update_reply<S>(conn: &mut FrameConn<S>) -> Result<UpdateReply>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let err = conn.read_string().await?;
    let ui_json = conn.read_string().await?;
    let commands = conn.read_bytes().await?;
    if !err.is_empty() {
        return Err(RouterClientError::Remote(err));
    }
    Ok(UpdateReply {
        ui_json,
        commands: decode_commands(&commands)?,
    })
}

fn decode_commands(bytes: &[u8]) -> Result<Vec<Command>> {
    Ok(commands_from_json(bytes)?)
}
