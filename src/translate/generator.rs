//! Text generation trait
//!
//! The translation stage talks to a chat-style text generation service. A
//! request is a short conversation of system and user turns; the response is
//! the generated text. Providers are selected once from configuration.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One turn of a generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

impl PromptTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generic trait for text generation providers
///
/// Implementations handle the transport (an HTTP API, or deterministic logic
/// for tests). Failures surface as `TranslationError`, `NetworkError` or
/// `ConfigError`; the caller decides whether a failed batch is fatal.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a response for a conversation
    ///
    /// # Arguments
    ///
    /// * `turns` - System and user turns, in order
    /// * `max_output_tokens` - Upper bound on generated tokens; providers may
    ///   clamp it further to their own limit
    async fn generate(&self, turns: &[PromptTurn], max_output_tokens: usize) -> SyncResult<String>;

    /// Name used in logs
    fn provider_name(&self) -> &str;
}

/// Fold a conversation into one prompt for single-turn APIs
///
/// User turns are kept verbatim; system turns are prefixed with `System:`.
pub fn fold_turns(turns: &[PromptTurn]) -> String {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::User => turn.content.clone(),
            Role::System => format!("System: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
