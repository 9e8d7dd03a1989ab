//! Provider configuration from TOML (`[[providers]]` array)

use serde::{Deserialize, Serialize};

/// One OpenAI-compatible endpoint.
///
/// The API key is never stored here; `api_key_alias` names the entry in the
/// encrypted secret store that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProviderConfig {
    /// Name used in completion requests (`Provider` field).
    pub name: String,
    /// Base URL up to and including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Secret store key holding the bearer token. Empty for keyless endpoints.
    pub api_key_alias: String,
    /// Model used by `llm_transcribe` when the request leaves it empty.
    pub transcription_model: Option<String>,
}

impl Default for FileProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_alias: String::new(),
            transcription_model: None,
        }
    }
}

impl FileProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.api_key_alias = alias.into();
        self
    }

    /// `base_url` without a trailing slash, ready for path joins.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
