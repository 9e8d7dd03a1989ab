//! Router command dispatch.
//!
//! Reads the command name, then the command's arguments, and writes the
//! reply frames. Replies that can fail start with `error_text` (empty on
//! success) and always carry every documented frame, empty on error.
//! Decoding failures of JSON arguments become error replies; a broken
//! connection just ends the task.

use super::server::RouterState;
use crate::wire::{FrameConn, Result};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use tokio::io::{AsyncRead, AsyncWrite};
use tooldesk_domain::{
    AudioFormat, BuildReply, ChangeReply, LlmCompletion, MsgId, TranscribeRequest, Uid,
    UpdateReply, commands_from_json, commands_to_json, progress_from_wire,
};
use tracing::{debug, info, warn};

type Conn<S> = FrameConn<S>;

pub(crate) async fn handle<S>(state: &RouterState, conn: &mut Conn<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let command = conn.read_string().await?;
    debug!(command = %command, "router command");

    match command.as_str() {
        "register" => {
            let tool_name = conn.read_string().await?;
            let port = conn.read_u64().await?;
            match u16::try_from(port) {
                Ok(port) => state.dispatcher.register(&tool_name, port),
                Err(_) => warn!(tool = %tool_name, port, "Register with invalid port"),
            }
            return Ok(());
        }
        "print" => {
            let tool_name = conn.read_string().await?;
            let text = conn.read_string().await?;
            info!(tool = %tool_name, "{}", text);
            return Ok(());
        }
        "storage_changed" => {
            let tool_name = conn.read_string().await?;
            let epoch = state.dispatcher.storage_changed(&tool_name).await;
            debug!(tool = %tool_name, epoch, "Storage invalidation forwarded");
            // Closing the connection tells the sender the broadcast is done.
            return Ok(());
        }
        "read_file" => {
            let path = conn.read_string().await?;
            match state.files.read(&path).await {
                Ok(Some(bytes)) => {
                    conn.write_str("").await?;
                    conn.write_bool(true).await?;
                    conn.write_bytes(&bytes).await?;
                }
                Ok(None) => {
                    conn.write_str("").await?;
                    conn.write_bool(false).await?;
                    conn.write_bytes(&[]).await?;
                }
                Err(e) => {
                    conn.write_str(&e.to_string()).await?;
                    conn.write_bool(false).await?;
                    conn.write_bytes(&[]).await?;
                }
            }
        }
        "write_file" => {
            let path = conn.read_string().await?;
            let bytes = conn.read_bytes().await?;
            let result = state.files.write(&path, &bytes).await;
            write_status(conn, result).await?;
        }
        "sub_call" => {
            let parent = MsgId(conn.read_u64().await?);
            let parent_ui_uid = Uid(conn.read_u64().await?);
            let tool_name = conn.read_string().await?;
            let function = conn.read_string().await?;
            let params_json = conn.read_string().await?;
            let result = state
                .dispatcher
                .sub_call(parent, parent_ui_uid, &tool_name, &function, &params_json)
                .await;
            write_build_reply(conn, result).await?;
        }
        "build" => {
            let tool_name = conn.read_string().await?;
            let ui_uid = Uid(conn.read_u64().await?);
            let function = conn.read_string().await?;
            let params_json = conn.read_string().await?;
            let result = state
                .dispatcher
                .build(&tool_name, ui_uid, &function, &params_json)
                .await;
            write_build_reply(conn, result).await?;
        }
        "change" => {
            let tool_name = conn.read_string().await?;
            let ui_uid = Uid(conn.read_u64().await?);
            let change_json = conn.read_string().await?;
            let result = state
                .dispatcher
                .change(&tool_name, ui_uid, &change_json)
                .await;
            write_change_reply(conn, result).await?;
        }
        "update" => {
            let tool_name = conn.read_string().await?;
            let ui_uid = Uid(conn.read_u64().await?);
            let sub_uid = Uid(conn.read_u64().await?);
            let result = state.dispatcher.update(&tool_name, ui_uid, sub_uid).await;
            write_update_reply(conn, result).await?;
        }
        "add_cmds" => {
            let msg_id = MsgId(conn.read_u64().await?);
            let bytes = conn.read_bytes().await?;
            let result = commands_from_json(&bytes)
                .map_err(|e| e.to_string())
                .and_then(|commands| {
                    state
                        .dispatcher
                        .sessions()
                        .add_cmds(msg_id, commands)
                        .map_err(|e| e.to_string())
                });
            write_status(conn, result).await?;
        }
        "progress" => {
            let msg_id = MsgId(conn.read_u64().await?);
            let done = progress_from_wire(conn.read_u64().await?);
            let label = conn.read_string().await?;
            let stop = state.dispatcher.sessions().progress(msg_id, done, &label);
            conn.write_bool(stop).await?;
        }
        "get_msgs" => {
            let msgs = state.dispatcher.sessions().snapshot();
            conn.write_str("").await?;
            conn.write_json(&msgs).await?;
        }
        "stop_msg_name" => {
            let target = conn.read_string().await?;
            let result = state.dispatcher.sessions().stop_id_or_name(&target);
            if let Ok(ids) = &result {
                info!(target = %target, stopped = ids.len(), "Stop requested");
            }
            write_status(conn, result).await?;
        }
        "set_msg_name" => {
            let msg_id = MsgId(conn.read_u64().await?);
            let name = conn.read_string().await?;
            let result = state.dispatcher.sessions().set_name(msg_id, &name);
            write_status(conn, result).await?;
        }
        "find_msg_name" => {
            let name = conn.read_string().await?;
            conn.write_str("").await?;
            match state.dispatcher.sessions().find_name(&name) {
                Some(info) => {
                    conn.write_bool(true).await?;
                    conn.write_json(&info).await?;
                }
                None => {
                    conn.write_bool(false).await?;
                    conn.write_bytes(&[]).await?;
                }
            }
        }
        "get_tools_shemas" => {
            let app = conn.read_string().await?;
            let schemas = state.dispatcher.tool_schemas(&app);
            conn.write_str("").await?;
            conn.write_json(&schemas).await?;
        }
        "llm_complete" => {
            let msg_id = MsgId(conn.read_u64().await?);
            let bytes = conn.read_bytes().await?;
            let mut completion: LlmCompletion = match serde_json::from_slice(&bytes) {
                Ok(c) => c,
                Err(e) => {
                    conn.write_str(&format!("invalid completion: {}", e)).await?;
                    conn.write_bytes(&[]).await?;
                    return conn.flush().await;
                }
            };
            if completion.uid.is_empty() {
                let n = state.next_completion.fetch_add(1, Ordering::Relaxed);
                completion.uid = format!("llm-{}", n);
            }
            let ticket = match state.completions.begin(&completion.uid) {
                Ok(ticket) => ticket,
                Err(e) => {
                    conn.write_str(&e.to_string()).await?;
                    conn.write_bytes(&[]).await?;
                    return conn.flush().await;
                }
            };
            let outcome = state.engine.execute(msg_id, completion, &ticket).await;
            let err = outcome.error.map(|e| e.to_string()).unwrap_or_default();
            conn.write_str(&err).await?;
            conn.write_json(&outcome.completion).await?;
            conn.flush().await?;
            // The finished entry stays visible to llm_find until the reply
            // has been delivered.
            drop(ticket);
            return Ok(());
        }
        "llm_find" => {
            let _msg_id = conn.read_u64().await?;
            let uid = conn.read_string().await?;
            conn.write_str("").await?;
            match state.completions.find(&uid) {
                Some(snapshot) => {
                    conn.write_bool(true).await?;
                    conn.write_json(&snapshot).await?;
                }
                None => {
                    conn.write_bool(false).await?;
                    conn.write_bytes(&[]).await?;
                }
            }
        }
        "llm_stop" => {
            let _msg_id = conn.read_u64().await?;
            let uid = conn.read_string().await?;
            let result = state.completions.stop(&uid);
            write_status(conn, result).await?;
        }
        "llm_transcribe" => {
            let _msg_id = conn.read_u64().await?;
            let bytes = conn.read_bytes().await?;
            let result = match serde_json::from_slice::<TranscribeRequest>(&bytes) {
                Ok(request) => state
                    .engine
                    .transcribe(&request)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(format!("invalid transcription request: {}", e)),
            };
            write_bytes_reply(conn, result).await?;
        }
        "start_microphone" => {
            let msg_id = MsgId(conn.read_u64().await?);
            let mic_uid = conn.read_string().await?;
            let result = state.microphone.start(msg_id, &mic_uid).await;
            write_status(conn, result).await?;
        }
        "stop_microphone" => {
            let mic_uid = conn.read_string().await?;
            let cancel = conn.read_bool().await?;
            let format = conn.read_string().await?;
            let result = match AudioFormat::from_str(&format) {
                Ok(format) => state
                    .microphone
                    .stop(&mic_uid, cancel, format)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            write_bytes_reply(conn, result).await?;
        }
        "generate_app" => {
            let name = conn.read_string().await?;
            let result = state.dispatcher.generate_app(&name).await;
            write_status(conn, result).await?;
        }
        "rename_app" => {
            let old = conn.read_string().await?;
            let new = conn.read_string().await?;
            let result = state.dispatcher.rename_app(&old, &new).await;
            write_status(conn, result).await?;
        }
        other => {
            warn!(command = %other, "Unknown router command");
            conn.write_str(&format!("unknown command: {}", other))
                .await?;
        }
    }
    conn.flush().await
}

async fn write_status<S, T, E>(conn: &mut Conn<S>, result: std::result::Result<T, E>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Display,
{
    match result {
        Ok(_) => conn.write_str("").await,
        Err(e) => conn.write_str(&e.to_string()).await,
    }
}

async fn write_bytes_reply<S>(
    conn: &mut Conn<S>,
    result: std::result::Result<Vec<u8>, String>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match result {
        Ok(bytes) => {
            conn.write_str("").await?;
            conn.write_bytes(&bytes).await
        }
        Err(e) => {
            conn.write_str(&e).await?;
            conn.write_bytes(&[]).await
        }
    }
}

pub(crate) async fn write_build_reply<S, E>(
    conn: &mut Conn<S>,
    result: std::result::Result<BuildReply, E>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Display,
{
    match result {
        Ok(reply) => {
            conn.write_str("").await?;
            conn.write_str(&reply.params_json).await?;
            conn.write_str(&reply.ui_json).await?;
            conn.write_str(&commands_to_json(&reply.commands)?).await
        }
        Err(e) => {
            conn.write_str(&e.to_string()).await?;
            conn.write_str("").await?;
            conn.write_str("").await?;
            conn.write_str("[]").await
        }
    }
}

pub(crate) async fn write_change_reply<S, E>(
    conn: &mut Conn<S>,
    result: std::result::Result<ChangeReply, E>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Display,
{
    match result {
        Ok(reply) => {
            conn.write_str("").await?;
            conn.write_str(&reply.params_json).await?;
            conn.write_str(&commands_to_json(&reply.commands)?).await
        }
        Err(e) => {
            conn.write_str(&e.to_string()).await?;
            conn.write_str("").await?;
            conn.write_str("[]").await
        }
    }
}

pub(crate) async fn write_update_reply<S, E>(
    conn: &mut Conn<S>,
    result: std::result::Result<UpdateReply, E>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Display,
{
    match result {
        Ok(reply) => {
            conn.write_str("").await?;
            conn.write_str(&reply.ui_json).await?;
            conn.write_str(&commands_to_json(&reply.commands)?).await
        }
        Err(e) => {
            conn.write_str(&e.to_string()).await?;
            conn.write_str("").await?;
            conn.write_str("[]").await
        }
    }
}
