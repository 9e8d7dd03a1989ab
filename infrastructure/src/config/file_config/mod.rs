//! Raw TOML configuration data types
//!
//! These structs mirror the config file one-to-one. Every section is
//! `#[serde(default)]`, so a partial file only overrides what it names.

mod providers;

pub use providers::FileProviderConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tooldesk_application::config::{CompletionParams, DispatchParams};

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("provider name cannot be empty")]
    EmptyProviderName,

    #[error("provider '{0}' is configured more than once")]
    DuplicateProvider(String),

    #[error("microphone.sample_rate cannot be 0")]
    ZeroSampleRate,
}

/// `[router]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRouterConfig {
    /// Listen port; 0 picks an ephemeral port.
    pub port: u16,
    /// Root for `read_file` / `write_file`.
    pub data_dir: PathBuf,
    /// Tool corpus: one `<App>/<App>` binary plus `schemas.json` per app.
    pub apps_dir: PathBuf,
    pub spawn_timeout_ms: u64,
}

impl Default for FileRouterConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tooldesk");
        Self {
            port: 0,
            data_dir: base.join("data"),
            apps_dir: base.join("apps"),
            spawn_timeout_ms: 10_000,
        }
    }
}

/// `[completion]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCompletionConfig {
    pub default_max_iteration: u32,
    pub progress_interval_ms: u64,
}

impl Default for FileCompletionConfig {
    fn default() -> Self {
        Self {
            default_max_iteration: 20,
            progress_interval_ms: 500,
        }
    }
}

/// `[secrets]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSecretsConfig {
    /// Encrypted store location. Defaults to `<data_dir>/secrets`.
    pub path: Option<PathBuf>,
    /// Environment variable holding the store passphrase.
    pub passphrase_env: String,
}

/// `[microphone]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMicrophoneConfig {
    pub record_command: String,
    pub sample_rate: u32,
    pub mp3_command: String,
}

impl Default for FileMicrophoneConfig {
    fn default() -> Self {
        Self {
            record_command: "arecord".to_string(),
            sample_rate: 16_000,
            mp3_command: "ffmpeg".to_string(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Daily rolling log files are written here when set.
    pub directory: Option<PathBuf>,
    /// JSONL transcript of completion traffic.
    pub conversation_log: Option<PathBuf>,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub router: FileRouterConfig,
    pub completion: FileCompletionConfig,
    pub providers: Vec<FileProviderConfig>,
    pub secrets: FileSecretsConfig,
    pub microphone: FileMicrophoneConfig,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Validate the configuration, returning every detected problem.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                issues.push(ConfigValidationError::EmptyProviderName);
            } else if !seen.insert(provider.name.as_str()) {
                issues.push(ConfigValidationError::DuplicateProvider(
                    provider.name.clone(),
                ));
            }
        }
        if self.microphone.sample_rate == 0 {
            issues.push(ConfigValidationError::ZeroSampleRate);
        }
        issues
    }

    pub fn provider(&self, name: &str) -> Option<&FileProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.secrets
            .path
            .clone()
            .unwrap_or_else(|| self.router.data_dir.join("secrets"))
    }

    pub fn dispatch_params(&self) -> DispatchParams {
        DispatchParams::default()
            .with_spawn_timeout(Duration::from_millis(self.router.spawn_timeout_ms))
    }

    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams::default()
            .with_default_max_iteration(self.completion.default_max_iteration)
            .with_progress_interval(Duration::from_millis(self.completion.progress_interval_ms))
    }
}
