//! Configuration file loading for tooldesk
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `TOOLDESK_*` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./tooldesk.toml` or `./.tooldesk.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/tooldesk/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileCompletionConfig, FileConfig, FileLoggingConfig,
    FileMicrophoneConfig, FileProviderConfig, FileRouterConfig, FileSecretsConfig,
};
pub use loader::ConfigLoader;
