//! Gemini generateContent provider
//!
//! The conversation is folded into a single user prompt; system turns are
//! prefixed with `System:`.
//!
//! # Authentication
//!
//! The provider loads the API key from the `GEMINI_API_TOKEN` environment
//! variable.

use super::generator::{PromptTurn, TextGenerator, fold_turns};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiTextPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Concatenated text parts of the first candidate
fn response_text(response: GeminiResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
    base_url: String,
}

impl GeminiProvider {
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
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Create a provider from the `GEMINI_API_TOKEN` environment variable
    pub fn from_env(model: String, temperature: f32) -> SyncResult<Self> {
        let api_key = std::env::var("GEMINI_API_TOKEN").map_err(|_| {
            SyncError::ConfigError("GEMINI_API_TOKEN environment variable not set".to_string())
        })?;
        Self::new(api_key, model, temperature)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(&self, turns: &[PromptTurn], max_output_tokens: usize) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiTextPart {
                    text: fold_turns(turns),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens,
            },
        }
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn generate(&self, turns: &[PromptTurn], max_output_tokens: usize) -> SyncResult<String> {
        debug!("🔄 Calling Gemini API ({})", self.model);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(turns, max_output_tokens))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                SyncError::ConfigError(format!("API client error ({}): {}", status, error_text))
            } else {
                SyncError::TranslationError(format!("API error ({}): {}", status, error_text))
            });
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            SyncError::TranslationError(format!("Failed to parse API response: {}", e))
        })?;
        response_text(parsed).ok_or_else(|| {
            warn!("⚠️  Gemini response was empty or blocked");
            SyncError::TranslationError("Gemini response was empty or blocked".to_string())
        })
    }

    fn provider_name(&self) -> &str {
        "Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new("g-secret".to_string(), "gemini-2.0-flash".to_string(), 0.1).unwrap()
    }

    // ========== Initialization Tests ==========

    #[test]
    fn test_new_with_empty_key() {
        let result = GeminiProvider::new(String::new(), "gemini-2.0-flash".to_string(), 0.1);
        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }

    #[test]
    fn test_debug_masks_key() {
        let debug_str = format!("{:?}", provider());
        assert!(debug_str.contains("***"));
        assert!(!debug_str.contains("g-secret"));
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            provider().with_base_url("http://localhost:9").endpoint(),
            "http://localhost:9/gemini-2.0-flash:generateContent"
        );
    }

    // ========== Wire Format Tests ==========

    #[test]
    fn test_request_folds_system_turns() {
        let turns = vec![PromptTurn::system("rules"), PromptTurn::user("text")];
        let json = serde_json::to_value(provider().request_body(&turns, 8000)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "System: rules\n\ntext");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8000);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"{\"A\":"},{"text":"\"甲\"}"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response_text(parsed).unwrap(), "{\"A\":\"甲\"}");
    }

    #[test]
    fn test_blocked_response_is_empty() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates":[{}]}"#).unwrap();
        assert!(response_text(parsed).is_none());
        let parsed: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(response_text(parsed).is_none());
    }
}
