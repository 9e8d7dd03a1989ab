//! Output formatter trait

use tooldesk_domain::{BuildReply, MsgInfo, ToolSchema};

/// Renders router replies for the terminal
pub trait OutputFormatter {
    /// Progress tray: one line per active session. `now` is unix seconds.
    fn format_msgs(&self, msgs: &[MsgInfo], now: f64) -> String;

    /// Schemas returned by `get_tools_shemas`
    fn format_schemas(&self, schemas: &[ToolSchema]) -> String;

    /// Reply of a host `build`
    fn format_reply(&self, reply: &BuildReply) -> String;
}
