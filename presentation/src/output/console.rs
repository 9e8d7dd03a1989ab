//! Console formatters for router replies

use crate::cli::commands::OutputFormat;
use crate::output::formatter::OutputFormatter;
use colored::Colorize;
use tooldesk_domain::{BuildReply, MsgInfo, ToolSchema};

/// Colored, human readable output
pub struct ConsoleFormatter;

/// Raw JSON output, one document per call
pub struct JsonFormatter;

/// Pick the formatter for `format`.
pub fn formatter_for(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(ConsoleFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

impl ConsoleFormatter {
    fn header(title: &str) -> String {
        format!("{}\n", format!("=== {} ===", title).cyan().bold())
    }

    /// `"12.3s"`, `"4m05s"` or `"1h02m"`.
    pub fn elapsed(seconds: f64) -> String {
        let secs = seconds.max(0.0);
        if secs < 60.0 {
            format!("{:.1}s", secs)
        } else if secs < 3600.0 {
            let whole = secs as u64;
            format!("{}m{:02}s", whole / 60, whole % 60)
        } else {
            let whole = secs as u64;
            format!("{}h{:02}m", whole / 3600, (whole % 3600) / 60)
        }
    }

    /// Name shown in the tray: the display name when set, else the tool.
    pub fn display_name(msg: &MsgInfo) -> &str {
        if msg.name.is_empty() {
            &msg.tool
        } else {
            &msg.name
        }
    }

    fn msg_line(msg: &MsgInfo, now: f64) -> String {
        let id = format!("#{}", msg.id);
        let percent = format!("{:>3}%", msg.percent());
        let status = if msg.cancelled {
            "stopping".red().to_string()
        } else {
            percent.green().to_string()
        };
        let mut line = format!(
            "{:>6} {:<16} {:<20} {} {:>8}",
            id.dimmed(),
            msg.tool.yellow(),
            Self::display_name(msg),
            status,
            Self::elapsed(msg.elapsed(now))
        );
        if !msg.progress_label.is_empty() {
            line.push_str(&format!("  {}", msg.progress_label.italic()));
        }
        if let Some(parent) = msg.parent {
            line.push_str(&format!("  {}", format!("(in #{})", parent).dimmed()));
        }
        line
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_msgs(&self, msgs: &[MsgInfo], now: f64) -> String {
        if msgs.is_empty() {
            return format!("{}\n", "No active sessions".dimmed());
        }
        let mut output = Self::header(&format!("{} active", msgs.len()));
        for msg in msgs {
            output.push_str(&Self::msg_line(msg, now));
            output.push('\n');
        }
        output
    }

    fn format_schemas(&self, schemas: &[ToolSchema]) -> String {
        if schemas.is_empty() {
            return format!("{}\n", "No tool schemas".dimmed());
        }
        let mut output = String::new();
        let mut current_app: Option<&str> = None;
        for schema in schemas {
            if current_app != Some(schema.app.as_str()) {
                current_app = Some(schema.app.as_str());
                output.push_str(&Self::header(&schema.app));
            }
            output.push_str(&format!("  {}", schema.name.bold()));
            if !schema.description.is_empty() {
                output.push_str(&format!(" - {}", schema.description));
            }
            output.push('\n');
        }
        output
    }

    fn format_reply(&self, reply: &BuildReply) -> String {
        let mut output = Self::header("Result");
        let pretty = serde_json::from_str::<serde_json::Value>(&reply.params_json)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| reply.params_json.clone());
        output.push_str(&pretty);
        output.push('\n');

        output.push_str(&format!("\n{} {}\n", "Tool result:".cyan().bold(), reply.tool_result()));

        if !reply.commands.is_empty() {
            output.push_str(&format!("\n{}\n", "Commands:".cyan().bold()));
            for command in &reply.commands {
                output.push_str(&format!("  * {}\n", command.kind()));
            }
        }
        output
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_msgs(&self, msgs: &[MsgInfo], _now: f64) -> String {
        serde_json::to_string_pretty(msgs).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_schemas(&self, schemas: &[ToolSchema]) -> String {
        serde_json::to_string_pretty(schemas).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_reply(&self, reply: &BuildReply) -> String {
        let value = serde_json::json!({
            "params": serde_json::from_str::<serde_json::Value>(&reply.params_json)
                .unwrap_or(serde_json::Value::String(reply.params_json.clone())),
            "ui": serde_json::from_str::<serde_json::Value>(&reply.ui_json)
                .unwrap_or(serde_json::Value::Null),
            "commands": reply.commands,
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tooldesk_domain::{Command, MsgId, Uid};

    fn msg(id: u64, tool: &str, name: &str) -> MsgInfo {
        MsgInfo {
            id: MsgId(id),
            tool: tool.to_string(),
            name: name.to_string(),
            start_time: 1000.0,
            progress: 0.42,
            progress_label: "scanning".to_string(),
            cancelled: false,
            parent: None,
        }
    }

    #[test]
    fn test_elapsed_units() {
        assert_eq!(ConsoleFormatter::elapsed(3.24), "3.2s");
        assert_eq!(ConsoleFormatter::elapsed(245.0), "4m05s");
        assert_eq!(ConsoleFormatter::elapsed(3720.0), "1h02m");
        assert_eq!(ConsoleFormatter::elapsed(-1.0), "0.0s");
    }

    #[test]
    fn test_display_name_prefers_session_name() {
        assert_eq!(ConsoleFormatter::display_name(&msg(1, "Mic", "mic:42")), "mic:42");
        assert_eq!(ConsoleFormatter::display_name(&msg(1, "Mic", "")), "Mic");
    }

    #[test]
    fn test_format_msgs_lists_each_session() {
        let mut child = msg(8, "Reader", "");
        child.parent = Some(MsgId(7));
        child.cancelled = true;
        let out = ConsoleFormatter.format_msgs(&[msg(7, "Looper", "nightly"), child], 1012.0);

        assert!(out.contains("2 active"));
        assert!(out.contains("#7"));
        assert!(out.contains("Looper"));
        assert!(out.contains("nightly"));
        assert!(out.contains("42%"));
        assert!(out.contains("12.0s"));
        assert!(out.contains("scanning"));
        assert!(out.contains("stopping"));
        assert!(out.contains("(in #7)"));
    }

    #[test]
    fn test_format_msgs_empty() {
        assert!(ConsoleFormatter.format_msgs(&[], 0.0).contains("No active sessions"));
    }

    #[test]
    fn test_format_schemas_groups_by_app() {
        let a = ToolSchema::new("Reader", "GetFoo", "Read foo", serde_json::json!({}));
        let b = ToolSchema::new("Writer", "SetFoo", "", serde_json::json!({}));
        let out = ConsoleFormatter.format_schemas(&[a, b]);
        assert!(out.contains("Reader"));
        assert!(out.contains("GetFoo"));
        assert!(out.contains("Read foo"));
        assert!(out.contains("Writer"));
    }

    #[test]
    fn test_json_reply_embeds_documents() {
        let reply = BuildReply {
            params_json: r#"{"Out_X":1}"#.to_string(),
            ui_json: String::new(),
            commands: vec![Command::open_centered(Uid(5))],
        };
        let value: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_reply(&reply)).unwrap();
        assert_eq!(value["params"]["Out_X"], 1);
        assert!(value["ui"].is_null());
        assert_eq!(value["commands"][0]["Type"], "OpenDialog");
    }

    #[test]
    fn test_console_reply_shows_tool_result_and_commands() {
        let reply = BuildReply {
            params_json: r#"{"Out_X":1}"#.to_string(),
            ui_json: String::new(),
            commands: vec![Command::SetClipboard { text: "x".to_string() }],
        };
        let out = ConsoleFormatter.format_reply(&reply);
        assert!(out.contains("\"Out_X\": 1"));
        assert!(out.contains("SetClipboard"));
    }
}
