//! DeepSeek chat completions provider
//!
//! Talks to the OpenAI-compatible `chat/completions` endpoint.
//!
//! # Authentication
//!
//! The provider loads the API key from the `DEEPSEEK_API_TOKEN` environment
//! variable.

use super::generator::{PromptTurn, TextGenerator};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptTurn],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct DeepSeekProvider {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
    base_url: String,
}

impl DeepSeekProvider {
    /// Chat models reject `max_tokens` above this
    const MAX_OUTPUT_TOKENS: usize = 8192;

    pub fn new(api_key: String, model: String, temperature: f32) -> SyncResult<Self> {
        if api_key.trim().is_empty() {
            return Err(SyncError::ConfigError("API key cannot be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| SyncError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model,
            temperature,
            client,
            base_url: DEEPSEEK_API_URL.to_string(),
        })
    }

    /// Create a provider from the `DEEPSEEK_API_TOKEN` environment variable
    pub fn from_env(model: String, temperature: f32) -> SyncResult<Self> {
        let api_key = std::env::var("DEEPSEEK_API_TOKEN").map_err(|_| {
            SyncError::ConfigError("DEEPSEEK_API_TOKEN environment variable not set".to_string())
        })?;
        Self::new(api_key, model, temperature)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn clamp_output(max_output_tokens: usize) -> usize {
        max_output_tokens.clamp(1, Self::MAX_OUTPUT_TOKENS)
    }
}

impl std::fmt::Debug for DeepSeekProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSeekProvider")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for DeepSeekProvider {
    async fn generate(&self, turns: &[PromptTurn], max_output_tokens: usize) -> SyncResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
            max_tokens: Self::clamp_output(max_output_tokens),
            stream: false,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(if status == reqwest::StatusCode::UNAUTHORIZED {
                SyncError::ConfigError(format!("API client error ({}): {}", status, error_text))
            } else {
                SyncError::TranslationError(format!("API error ({}): {}", status, error_text))
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            SyncError::TranslationError(format!("Failed to parse API response: {}", e))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                SyncError::TranslationError("Invalid API response: no message content".to_string())
            })?;
        debug!("DeepSeek returned {} bytes", content.len());
        Ok(content)
    }

    fn provider_name(&self) -> &str {
        "DeepSeek"
    }
}
