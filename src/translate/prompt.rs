//! Batch prompts and response parsing
//!
//! A batch is sent as one JSON object keyed by section key. Each entry says
//! what happened to the section and carries the text the service needs:
//! the new source for added sections, and for modified sections the old and
//! new source together with the current target text so that only the edit
//! is carried over. The service answers with a JSON object mapping the same
//! keys to translated markdown.

use super::generator::PromptTurn;
use crate::change::Operation;
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One section of a translation batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRequest {
    pub operation: Operation,
    pub source_new: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_old: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_current: Option<String>,
}

/// Payload embedded in the user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub source_language: String,
    pub target_language: String,
    pub sections: BTreeMap<String, SectionRequest>,
}

const SYSTEM_PROMPT: &str = "You are a professional technical writer who keeps translated \
documentation in sync with its source. Preserve markdown structure, code blocks, links, \
anchors, front matter keys and product names exactly. Answer with a single JSON object and \
nothing else.";

/// Build the conversation for one batch
pub fn build_batch_prompt(payload: &BatchPayload) -> SyncResult<Vec<PromptTurn>> {
    let instructions = format!(
        "Each entry of the JSON object below is a documentation section, keyed by its id.\n\
         - \"added\": translate source_new from {src} into {tgt}.\n\
         - \"modified\": source_old was edited into source_new. Apply the same edit to \
         target_current, the existing {tgt} text, and change nothing else.\n\
         Return a JSON object mapping every id to the complete {tgt} markdown of that section, \
         including its heading line.",
        src = payload.source_language,
        tgt = payload.target_language,
    );
    let body = serde_json::to_string_pretty(payload)?;
    Ok(vec![
        PromptTurn::system(SYSTEM_PROMPT),
        PromptTurn::user(format!("{}\n\n```json\n{}\n```", instructions, body)),
    ])
}

/// The JSON text of a prompt or response
///
/// A bare object is taken as is. Otherwise the body of the fenced block,
/// closed by the last fence since section text may hold fences of its own.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{')
        && let Some(start) = trimmed.find("```")
    {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
        let body = &after_fence[body_start..];
        if let Some(end) = body.rfind("```") {
            return Some(body[..end].trim());
        }
    }
    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    (open < close).then(|| &trimmed[open..=close])
}

/// Recover the payload from a built prompt
pub fn payload_from_turns(turns: &[PromptTurn]) -> SyncResult<BatchPayload> {
    let user = turns
        .iter()
        .rev()
        .find(|t| t.role == super::generator::Role::User)
        .ok_or_else(|| SyncError::TranslationError("Prompt has no user turn".to_string()))?;
    let json = extract_json(&user.content)
        .ok_or_else(|| SyncError::TranslationError("Prompt has no JSON payload".to_string()))?;
    Ok(serde_json::from_str(json)?)
}

/// Parse a service response into section key → translated content
///
/// Non-string values are dropped; those sections count as missing.
pub fn parse_translations(response: &str) -> SyncResult<BTreeMap<String, String>> {
    let json = extract_json(response).ok_or_else(|| {
        SyncError::TranslationError("Response does not contain a JSON object".to_string())
    })?;
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SyncError::TranslationError(format!("Malformed response JSON: {}", e)))?;
    let object = value.as_object().ok_or_else(|| {
        SyncError::TranslationError("Response JSON is not an object".to_string())
    })?;
    Ok(object
        .iter()
        .filter_map(|(key, value)| value.as_str().map(|s| (key.clone(), s.to_string())))
        .collect())
}
