use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::chat::prompt::{BackendKind, PromptPayload, END_OF_TURN, START_OF_TURN};

/// Sampling and limit settings shared by both adapters. Read from the
/// environment once at startup and injected at construction.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "local-model".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            timeout: Duration::from_secs(120),
        }
    }
}

/// One turn of generation over an assembled payload.
///
/// The dominant latency source in the system, and fallible in every
/// way a network call is. Callers decide what a failure means for
/// conversation state; adapters only report it.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Which payload shape and role vocabulary this backend expects.
    fn kind(&self) -> BackendKind;

    async fn generate(&self, payload: PromptPayload) -> Result<String>;
}

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Adapter for a local model server exposing a raw-completion endpoint
/// and speaking the Gemma chat template.
pub struct GemmaServerModel {
    server_url: String,
    client: Client,
    config: GenerationConfig,
}

impl GemmaServerModel {
    pub fn new(server_url: String, config: GenerationConfig) -> Result<Self> {
        info!("Using local model server at: {}", server_url);
        let client = build_client(config.timeout)?;
        Ok(Self {
            server_url,
            client,
            config,
        })
    }
}

#[async_trait]
impl GenerationBackend for GemmaServerModel {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemma
    }

    async fn generate(&self, payload: PromptPayload) -> Result<String> {
        let prompt = match payload {
            PromptPayload::Text(prompt) => prompt,
            PromptPayload::Messages(_) => {
                anyhow::bail!("local backend expects a flat text prompt")
            }
        };
        debug!("Prompt: {}", prompt);

        let url = format!("{}/v1/completions", self.server_url);
        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "stop": [END_OF_TURN],
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            anyhow::bail!("completion request failed ({}): {}", status, error_text);
        }

        let response_json: Value = response.json().await?;
        debug!("Response JSON: {}", response_json);

        let text = response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("text"))
            .and_then(|text| text.as_str())
            .ok_or_else(|| anyhow::anyhow!("no completion text in response"))?;

        info!("Response length: {} characters", text.len());
        Ok(strip_turn_markers(text))
    }
}

/// Adapter for an OpenAI-compatible chat completions API, remote or a
/// local server run with the OpenAI surface.
pub struct OpenAiChatModel {
    api_url: String,
    api_key: Option<String>,
    client: Client,
    config: GenerationConfig,
}

impl OpenAiChatModel {
    pub fn new(api_url: String, api_key: Option<String>, config: GenerationConfig) -> Result<Self> {
        info!("Using chat completions API at: {}", api_url);
        let client = build_client(config.timeout)?;
        Ok(Self {
            api_url,
            api_key,
            client,
            config,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiChatModel {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    async fn generate(&self, payload: PromptPayload) -> Result<String> {
        let messages = match payload {
            PromptPayload::Messages(messages) => messages,
            PromptPayload::Text(_) => {
                anyhow::bail!("chat backend expects structured messages")
            }
        };

        let url = format!("{}/v1/chat/completions", self.api_url);
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "max_tokens": self.config.max_tokens,
        });
        debug!("Payload: {}", body);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            anyhow::bail!("API request failed ({}): {}", status, error_text);
        }

        let response_json: Value = response.json().await?;
        debug!("Response JSON: {}", response_json);

        let content = response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| anyhow::anyhow!("no message content in response"))?;

        info!("Response length: {} characters", content.len());
        Ok(content.trim().to_string())
    }
}

/// Generated text must never re-enter a prompt carrying raw turn
/// markers, so they are removed before the text leaves the adapter.
fn strip_turn_markers(text: &str) -> String {
    text.replace(START_OF_TURN, "")
        .replace(END_OF_TURN, "")
        .trim()
        .to_string()
}
