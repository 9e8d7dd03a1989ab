//! OpenAI-compatible chat and transcription client.
//!
//! One gateway serves every configured provider; requests are routed by the
//! provider name carried in the completion. Any endpoint speaking the
//! `/chat/completions` streaming dialect works (OpenAI, Groq, Mistral,
//! local servers).

use crate::config::FileConfig;
use crate::secrets::SecretStore;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tooldesk_application::{ChatEvent, ChatRequest, GatewayError, LlmGateway, StreamHandle};
use tooldesk_domain::{AudioFormat, TranscribeRequest};
use tracing::{debug, warn};

use super::sse::SseDecoder;

const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const STREAM_BUFFER: usize = 64;

/// Resolved settings for one provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    /// `None` when the provider needs no key.
    pub api_key: Option<String>,
    /// Alias that failed to resolve; requests fail with `MissingApiKey`.
    pub missing_key: bool,
    pub transcription_model: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            missing_key: false,
            transcription_model: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

pub struct OpenAiGateway {
    client: reqwest::Client,
    providers: HashMap<String, ProviderEndpoint>,
}

impl Default for OpenAiGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiGateway {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            providers: HashMap::new(),
        }
    }

    pub fn with_provider(mut self, name: impl Into<String>, endpoint: ProviderEndpoint) -> Self {
        self.providers.insert(name.into(), endpoint);
        self
    }

    /// Build from `[[providers]]`, resolving key aliases in `secrets`.
    ///
    /// A provider whose alias cannot be resolved is still registered so the
    /// failure surfaces on use with a clear error instead of at startup.
    pub fn from_config(config: &FileConfig, secrets: Option<&SecretStore>) -> Self {
        let mut gateway = Self::new();
        for provider in &config.providers {
            let mut endpoint = ProviderEndpoint::new(provider.base_url.clone());
            endpoint.transcription_model = provider.transcription_model.clone();
            if !provider.api_key_alias.is_empty() {
                let key = match secrets.map(|s| s.get(&provider.api_key_alias)) {
                    Some(Ok(key)) => key,
                    Some(Err(e)) => {
                        warn!(provider = %provider.name, error = %e, "Secret store unreadable");
                        None
                    }
                    None => None,
                };
                endpoint.missing_key = key.is_none();
                endpoint.api_key = key;
            }
            gateway.providers.insert(provider.name.clone(), endpoint);
        }
        gateway
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn endpoint(&self, provider: &str) -> Result<&ProviderEndpoint, GatewayError> {
        let endpoint = self
            .providers
            .get(provider)
            .ok_or_else(|| GatewayError::UnknownProvider(provider.to_string()))?;
        if endpoint.missing_key {
            return Err(GatewayError::MissingApiKey(provider.to_string()));
        }
        Ok(endpoint)
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        endpoint: &ProviderEndpoint,
    ) -> reqwest::RequestBuilder {
        match &endpoint.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status { status, body })
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<StreamHandle, GatewayError> {
        let endpoint = self.endpoint(&request.provider)?;
        let url = endpoint.url("chat/completions");
        debug!(provider = %request.provider, model = %request.model, messages = request.messages.len(), "Opening chat stream");

        let response = self
            .authorized(self.client.post(&url), endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.to_openai_body())
            .send()
            .await
            .map_err(|e| GatewayError::ConnectionError(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let mut body = response.bytes_stream();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(item) = body.next().await {
                let events = match item {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(e) => vec![ChatEvent::Error(GatewayError::ConnectionError(
                        e.to_string(),
                    ))],
                };
                for event in events {
                    let terminal = matches!(event, ChatEvent::Done | ChatEvent::Error(_));
                    // Receiver gone: the engine stopped listening, drop the body.
                    if tx.send(event).await.is_err() || terminal {
                        return;
                    }
                }
            }
            for event in decoder.finish() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if !decoder.is_done() {
                let _ = tx.send(ChatEvent::Done).await;
            }
        });

        Ok(StreamHandle::new(rx))
    }

    async fn transcribe(&self, request: &TranscribeRequest) -> Result<Vec<u8>, GatewayError> {
        let endpoint = self.endpoint(&request.app_name)?;
        let model = if !request.model.is_empty() {
            request.model.clone()
        } else {
            endpoint
                .transcription_model
                .clone()
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string())
        };
        let mime = request
            .blob_name
            .rsplit_once('.')
            .and_then(|(_, ext)| ext.parse::<AudioFormat>().ok())
            .unwrap_or_default()
            .mime_type();

        let file = Part::bytes(request.blob.clone())
            .file_name(request.blob_name.clone())
            .mime_str(mime)
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", model)
            .text("temperature", request.temperature.to_string());
        for (key, value) in [
            ("response_format", &request.response_format),
            ("language", &request.language),
            ("prompt", &request.prompt),
        ] {
            if !value.is_empty() {
                form = form.text(key, value.clone());
            }
        }

        debug!(provider = %request.app_name, bytes = request.blob.len(), "Transcribing");
        let response = self
            .authorized(self.client.post(endpoint.url("audio/transcriptions")), endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::ConnectionError(e.to_string()))?;
        let response = Self::check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::ConnectionError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
