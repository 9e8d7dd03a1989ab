//! Router → tool transport over the frame codec.

use super::client::{RouterClientError, read_build_reply, read_change_reply, read_update_reply};
use crate::wire::{FrameConn, WireError};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tooldesk_application::ports::tool_transport::{BuildRequest, ToolTransport, TransportError};
use tooldesk_domain::{BuildReply, ChangeReply, Endpoint, MsgId, Uid, UpdateReply};
use tracing::trace;

/// Dials a tool's loopback port once per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolClient;

impl ToolClient {
    pub fn new() -> Self {
        Self
    }

    async fn open(
        &self,
        endpoint: &Endpoint,
        command: &str,
    ) -> Result<FrameConn<TcpStream>, TransportError> {
        trace!(tool = %endpoint.tool_name, port = endpoint.port, command, "tool call");
        let mut conn = FrameConn::connect(endpoint.port).await.map_err(wire_error)?;
        conn.write_str(command).await.map_err(wire_error)?;
        Ok(conn)
    }
}

fn wire_error(e: WireError) -> TransportError {
    if e.is_transport() {
        TransportError::Unreachable(e.to_string())
    } else {
        TransportError::Protocol(e.to_string())
    }
}

fn reply_error(e: RouterClientError) -> TransportError {
    match e {
        RouterClientError::Remote(text) => TransportError::Remote(text),
        RouterClientError::Wire(w) => wire_error(w),
    }
}

#[async_trait]
impl ToolTransport for ToolClient {
    async fn build(
        &self,
        endpoint: &Endpoint,
        request: &BuildRequest,
    ) -> Result<BuildReply, TransportError> {
        let mut conn = self.open(endpoint, "build").await?;
        async {
            conn.write_u64(request.msg_id.as_u64()).await?;
            conn.write_u64(request.ui_uid.as_u64()).await?;
            conn.write_str(&request.function).await?;
            conn.write_str(&request.params_json).await?;
            conn.flush().await
        }
        .await
        .map_err(wire_error)?;
        read_build_reply(&mut conn).await.map_err(reply_error)
    }

    async fn change(
        &self,
        endpoint: &Endpoint,
        msg_id: MsgId,
        ui_uid: Uid,
        change_json: &str,
    ) -> Result<ChangeReply, TransportError> {
        let mut conn = self.open(endpoint, "change").await?;
        async {
            conn.write_u64(msg_id.as_u64()).await?;
            conn.write_u64(ui_uid.as_u64()).await?;
            conn.write_str(change_json).await?;
            conn.flush().await
        }
        .await
        .map_err(wire_error)?;
        read_change_reply(&mut conn).await.map_err(reply_error)
    }

    async fn update(
        &self,
        endpoint: &Endpoint,
        msg_id: MsgId,
        ui_uid: Uid,
        sub_uid: Uid,
    ) -> Result<UpdateReply, TransportError> {
        let mut conn = self.open(endpoint, "update").await?;
        async {
            conn.write_u64(msg_id.as_u64()).await?;
            conn.write_u64(ui_uid.as_u64()).await?;
            conn.write_u64(sub_uid.as_u64()).await?;
            conn.flush().await
        }
        .await
        .map_err(wire_error)?;
        read_update_reply(&mut conn).await.map_err(reply_error)
    }

    async fn storage_changed(
        &self,
        endpoint: &Endpoint,
        tool_name: &str,
    ) -> Result<(), TransportError> {
        let mut conn = self.open(endpoint, "storage_changed").await?;
        async {
            conn.write_str(tool_name).await?;
            conn.flush().await?;
            conn.wait_closed().await
        }
        .await
        .map_err(wire_error)
    }

    async fn exit(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let mut conn = self.open(endpoint, "exit").await?;
        conn.flush().await.map_err(wire_error)
    }
}
