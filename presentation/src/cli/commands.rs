//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for client commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored, human readable
    Text,
    /// JSON, as received from the router
    Json,
}

/// CLI arguments for tooldesk
#[derive(Parser, Debug)]
#[command(name = "tooldesk")]
#[command(author, version, about = "Local router for desktop tool apps and LLM completions")]
#[command(long_about = r#"
tooldesk runs the router that tool apps register with, and talks to a
running router from the command line.

Configuration files are loaded from (in priority order):
1. TOOLDESK_* environment variables (nested keys split on "__")
2. --config <path>     Explicit config file
3. ./tooldesk.toml     Project-level config
4. ~/.config/tooldesk/config.toml   Global config

Example:
  tooldesk serve --port 8100
  tooldesk call Activities GetListOfActivities '{"SortBy":"date"}'
  tooldesk msgs --watch
  tooldesk stop mic:42
  tooldesk secrets set openai
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Router port for client commands (defaults to the running router's)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Output format for client commands
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the router until interrupted
    Serve,

    /// Build a tool function through the router and print its reply
    Call {
        tool: String,
        function: String,
        /// Parameter record as JSON
        #[arg(default_value = "{}")]
        params: String,
        /// UI uid the build is attached to
        #[arg(long, default_value_t = 1)]
        ui_uid: u64,
    },

    /// Print the active sessions
    Msgs {
        /// Keep refreshing until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Refresh interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },

    /// Cancel a session by id or name
    Stop { target: String },

    /// List tool schemas known to the router
    Schemas {
        /// Restrict to one app
        app: Option<String>,
    },

    /// Create an empty app in the corpus
    GenerateApp { name: String },

    /// Rename an app in the corpus
    RenameApp { old: String, new: String },

    /// Edit the encrypted secret store
    Secrets {
        #[command(subcommand)]
        action: SecretsAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SecretsAction {
    /// Store a secret; reads the value from stdin when omitted
    Set { alias: String, value: Option<String> },
    /// Print a secret
    Get { alias: String },
    /// List stored aliases
    List,
    /// Delete a secret
    Remove { alias: String },
}

impl Cli {
    /// The subcommand, `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
