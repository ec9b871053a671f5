//! Mock text generator for testing
//!
//! Reads the batch payload back out of the prompt and answers with a JSON
//! object, without API keys or network access.
//!
//! # Example
//!
//! ```ignore
//! use banana_docsync::translate::{MockGenerator, MockMode};
//!
//! let mock = MockGenerator::new(MockMode::Suffix);
//! // "# Setup\n\nnew\n" comes back as "# Setup\n\nnew_Chinese\n"
//! ```

use super::generator::{PromptTurn, TextGenerator};
use super::prompt::payload_from_turns;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock generation modes for testing different scenarios
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Append the target language to the text: "new" → "new_Chinese"
    Suffix,

    /// Predefined translations keyed by new source content, falling back to Suffix
    Mappings(HashMap<String, String>),

    /// Fail every batch that contains this section key; others use Suffix
    FailOnKey(String),

    /// Answer with an empty object, leaving every section untranslated
    Omit,

    /// Simulate service errors
    Error(String),

    /// Return the new source unchanged
    NoOp,
}

#[derive(Debug)]
pub struct MockGenerator {
    mode: MockMode,
    /// Optional simulated network delay (in milliseconds)
    delay_ms: u64,
    calls: AtomicUsize,
}

fn suffixed(text: &str, language: &str) -> String {
    let body = text.trim_end();
    format!("{}_{}{}", body, language, &text[body.len()..])
}

impl MockGenerator {
    pub fn new(mode: MockMode) -> Self {
        Self::with_delay(mode, 0)
    }

    pub fn with_delay(mode: MockMode, delay_ms: u64) -> Self {
        Self {
            mode,
            delay_ms,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of generate calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, turns: &[PromptTurn]) -> SyncResult<String> {
        if let MockMode::Error(msg) = &self.mode {
            return Err(SyncError::TranslationError(msg.clone()));
        }

        let payload = payload_from_turns(turns)?;
        let language = payload.target_language.as_str();
        if let MockMode::FailOnKey(key) = &self.mode
            && payload.sections.contains_key(key)
        {
            return Err(SyncError::TranslationError(format!(
                "Simulated failure for {}",
                key
            )));
        }

        let translations: BTreeMap<String, String> = match &self.mode {
            MockMode::Omit => BTreeMap::new(),
            _ => payload
                .sections
                .iter()
                .map(|(key, section)| {
                    let text = match &self.mode {
                        MockMode::NoOp => section.source_new.clone(),
                        MockMode::Mappings(map) => map
                            .get(&section.source_new)
                            .cloned()
                            .unwrap_or_else(|| suffixed(&section.source_new, language)),
                        _ => suffixed(&section.source_new, language),
                    };
                    (key.clone(), text)
                })
                .collect(),
        };
        Ok(format!("```json\n{}\n```", serde_json::to_string(&translations)?))
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, turns: &[PromptTurn], _max_output_tokens: usize) -> SyncResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.respond(turns)
    }

    fn provider_name(&self) -> &str {
        "Mock Generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Operation;
    use crate::translate::prompt::{
        BatchPayload, SectionRequest, build_batch_prompt, parse_translations,
    };

    fn turns(keys: &[&str]) -> Vec<PromptTurn> {
        let sections = keys
            .iter()
            .map(|k| {
                (
                    k.to_string(),
                    SectionRequest {
                        operation: Operation::Added,
                        source_new: format!("# {}\n\nbody\n", k),
                        source_old: None,
                        target_current: None,
                    },
                )
            })
            .collect();
        build_batch_prompt(&BatchPayload {
            source_language: "English".to_string(),
            target_language: "fr".to_string(),
            sections,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_suffix_mode() {
        let mock = MockGenerator::new(MockMode::Suffix);
        let response = mock.generate(&turns(&["A"]), 100).await.unwrap();
        let parsed = parse_translations(&response).unwrap();
        assert_eq!(parsed["A"], "# A\n\nbody_fr\n");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_mappings_mode() {
        let mut map = HashMap::new();
        map.insert("# A\n\nbody\n".to_string(), "# 甲\n\n正文\n".to_string());
        let mock = MockGenerator::new(MockMode::Mappings(map));
        let parsed = parse_translations(&mock.generate(&turns(&["A", "B"]), 100).await.unwrap()).unwrap();
        assert_eq!(parsed["A"], "# 甲\n\n正文\n");
        assert_eq!(parsed["B"], "# B\n\nbody_fr\n");
    }

    #[tokio::test]
    async fn test_fail_on_key() {
        let mock = MockGenerator::new(MockMode::FailOnKey("B".to_string()));
        assert!(mock.generate(&turns(&["A"]), 100).await.is_ok());
        assert!(mock.generate(&turns(&["A", "B"]), 100).await.is_err());
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_error_and_omit_modes() {
        let error = MockGenerator::new(MockMode::Error("boom".to_string()));
        assert!(matches!(
            error.generate(&turns(&["A"]), 100).await,
            Err(SyncError::TranslationError(_))
        ));

        let omit = MockGenerator::new(MockMode::Omit);
        let parsed = parse_translations(&omit.generate(&turns(&["A"]), 100).await.unwrap()).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn test_delay() {
        let mock = MockGenerator::with_delay(MockMode::NoOp, 20);
        let start = std::time::Instant::now();
        let parsed = parse_translations(&mock.generate(&turns(&["A"]), 100).await.unwrap()).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(parsed["A"], "# A\n\nbody\n");
    }
}
