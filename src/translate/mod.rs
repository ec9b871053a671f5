//! Translation service providers
//!
//! The merge engine only sees the `TextGenerator` trait. Concrete providers
//! are chosen once from `ProviderConfig`:
//!
//! 1. **DeepSeek** - OpenAI-compatible chat completions
//! 2. **Gemini** - generateContent with the conversation folded into one prompt
//! 3. **Mock** - deterministic, offline; used by tests and dry runs
//!
//! Batch prompts and response parsing live in `prompt`, shared by all
//! providers.
//!
//! # Example
//!
//! ```ignore
//! use banana_docsync::config::SyncConfig;
//! use banana_docsync::translate::build_generator;
//!
//! let config = SyncConfig::default();
//! let generator = build_generator(&config)?;
//! println!("Using {}", generator.provider_name());
//! ```

pub mod deepseek;
pub mod gemini;
pub mod generator;
pub mod mock;
pub mod prompt;

pub use deepseek::DeepSeekProvider;
pub use gemini::GeminiProvider;
pub use generator::{PromptTurn, Role, TextGenerator, fold_turns};
pub use mock::{MockGenerator, MockMode};
pub use prompt::{BatchPayload, SectionRequest, build_batch_prompt, parse_translations};

use crate::config::{ProviderKind, SyncConfig};
use crate::error::SyncResult;
use std::sync::Arc;

/// Construct the configured provider, reading its API token from the environment
pub fn build_generator(config: &SyncConfig) -> SyncResult<Arc<dyn TextGenerator>> {
    let provider = &config.provider;
    Ok(match provider.kind {
        ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::from_env(
            provider.model(),
            provider.temperature,
        )?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::from_env(
            provider.model(),
            provider.temperature,
        )?),
        ProviderKind::Mock => Arc::new(MockGenerator::new(MockMode::Suffix)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_mock_generator() {
        let config = SyncConfig::default().with_provider(ProviderKind::Mock);
        let generator = build_generator(&config).unwrap();
        assert_eq!(generator.provider_name(), "Mock Generator");
    }
}
