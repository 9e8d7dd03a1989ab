//! Tool transport port
//!
//! How the router reaches a registered tool process. The wire adapter dials
//! the tool's loopback port once per request.

use async_trait::async_trait;
use thiserror::Error;
use tooldesk_domain::{BuildReply, ChangeReply, Endpoint, MsgId, Uid, UpdateReply};

/// Errors from one router → tool round-trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Dial or I/O failure. The endpoint should be considered dead.
    #[error("tool_unreachable: {0}")]
    Unreachable(String),

    /// The tool answered with a non-empty `error_text`.
    #[error("{0}")]
    Remote(String),

    /// The tool answered with frames that could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// A `build` request as forwarded to a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub msg_id: MsgId,
    pub ui_uid: Uid,
    /// Entry of the tool's dispatch table.
    pub function: String,
    pub params_json: String,
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn build(
        &self,
        endpoint: &Endpoint,
        request: &BuildRequest,
    ) -> Result<BuildReply, TransportError>;

    async fn change(
        &self,
        endpoint: &Endpoint,
        msg_id: MsgId,
        ui_uid: Uid,
        change_json: &str,
    ) -> Result<ChangeReply, TransportError>;

    async fn update(
        &self,
        endpoint: &Endpoint,
        msg_id: MsgId,
        ui_uid: Uid,
        sub_uid: Uid,
    ) -> Result<UpdateReply, TransportError>;

    /// Tell the tool that files owned by `tool_name` changed on disk.
    async fn storage_changed(
        &self,
        endpoint: &Endpoint,
        tool_name: &str,
    ) -> Result<(), TransportError>;

    /// Ask the tool process to exit.
    async fn exit(&self, endpoint: &Endpoint) -> Result<(), TransportError>;
}
