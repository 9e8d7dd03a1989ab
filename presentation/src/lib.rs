//! Presentation layer for tooldesk
//!
//! This crate contains CLI definitions, output formatters for router
//! replies, and the progress tray shown by `tooldesk msgs`.

pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use cli::commands::{Cli, Command, OutputFormat, SecretsAction};
pub use output::console::{ConsoleFormatter, JsonFormatter, formatter_for};
pub use output::formatter::OutputFormatter;
pub use progress::reporter::{SimpleTray, TrayReporter, TrayView};
