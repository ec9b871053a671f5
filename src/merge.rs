//! Translation and merge
//!
//! Matched records are grouped into batches bounded by an estimated
//! content size, each batch is sent to the translation service as one
//! request, and the answers are written back onto the records. Merging then
//! rebuilds the target document from its section bodies: a replaced section
//! gets its new content, a removed one is left out, insertions follow their
//! anchor, and every other body is copied through unchanged.
//!
//! A failed batch leaves its records untranslated and the remaining batches
//! still run. Whether a file with missing translations may be merged is the
//! caller's decision.

use crate::budget::{HeuristicEstimator, TokenEstimator};
use crate::change::Operation;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::matcher::{MatchRecord, TargetLocation};
use crate::section::SectionTree;
use crate::translate::{
    BatchPayload, SectionRequest, TextGenerator, build_batch_prompt, parse_translations,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of translating one file's records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationReport {
    pub batches: usize,
    pub failed_batches: usize,
    pub translated: usize,
    /// Keys that needed a translation and did not get one
    pub missing: Vec<String>,
}

impl TranslationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

struct PendingSection {
    key: String,
    request: SectionRequest,
    cost: usize,
}

/// Trailing whitespace of `text`
fn trailing_whitespace(text: &str) -> &str {
    &text[text.trim_end().len()..]
}

/// `content` with the trailing whitespace of `like`, or a single newline
fn fit_trailing(content: &str, like: &str) -> String {
    let tail = trailing_whitespace(like);
    let tail = if tail.is_empty() { "\n" } else { tail };
    format!("{}{}", content.trim_end(), tail)
}

/// Rebuild the target document with the records applied
///
/// Bodies of target sections no record refers to are copied byte for byte.
/// Insertions anchored on the same section follow their source order, so
/// the result does not depend on the order of `records`.
pub fn merge_document(target_text: &str, target_tree: &SectionTree, records: &[MatchRecord]) -> String {
    let mut out = String::with_capacity(target_text.len());
    let mut touched = false;

    for entry in target_tree.entries() {
        let body = entry.body(target_text);
        let replacement = records
            .iter()
            .find(|r| matches!(&r.target, TargetLocation::Section(key) if key == &entry.key));

        match replacement {
            Some(record) if record.source_operation == Operation::Deleted => {
                debug!("Removing {}", entry.key);
                touched = true;
            }
            Some(record) => match &record.target_new_content {
                Some(content) => {
                    out.push_str(&fit_trailing(content, body));
                    touched = true;
                }
                None => out.push_str(body),
            },
            None => out.push_str(body),
        }

        let mut insertions: Vec<&MatchRecord> = records
            .iter()
            .filter(|r| matches!(&r.target, TargetLocation::After(key) if key == &entry.key))
            .collect();
        insertions.sort_by(|a, b| a.source_position.cmp(&b.source_position));
        for record in insertions {
            let Some(content) = &record.target_new_content else {
                continue;
            };
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            out.push_str(&fit_trailing(content, &record.source_content));
            touched = true;
        }
    }

    if touched {
        let kept = out.trim_end().len();
        out.truncate(kept);
        out.push_str(trailing_whitespace(target_text));
    }
    out
}

/// Batches records, calls the translation service and merges the results
pub struct TranslationMergeEngine {
    generator: Arc<dyn TextGenerator>,
    estimator: HeuristicEstimator,
    batch_token_limit: usize,
    max_output_tokens: usize,
    source_language: String,
    target_language: String,
}

impl TranslationMergeEngine {
    pub fn new(config: &SyncConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            estimator: HeuristicEstimator,
            batch_token_limit: config.provider.batch_token_limit(),
            max_output_tokens: config.provider.max_output_tokens,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
        }
    }

    pub fn with_batch_token_limit(mut self, limit: usize) -> Self {
        self.batch_token_limit = limit;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.generator.provider_name()
    }

    fn cost(&self, request: &SectionRequest) -> usize {
        [
            Some(request.source_new.as_str()),
            request.source_old.as_deref(),
            request.target_current.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(|text| {
            self.estimator
                .estimate(text)
                .map(|n| n as usize)
                .unwrap_or(text.len() / 4)
        })
        .sum()
    }

    fn pending(&self, key: &str, request: SectionRequest) -> PendingSection {
        PendingSection {
            key: key.to_string(),
            cost: self.cost(&request),
            request,
        }
    }

    /// Group pending sections in order so no batch exceeds the limit
    ///
    /// A section larger than the limit on its own gets a batch of its own.
    fn plan_batches(&self, pending: Vec<PendingSection>) -> Vec<Vec<PendingSection>> {
        let mut batches = Vec::new();
        let mut current: Vec<PendingSection> = Vec::new();
        let mut current_cost = 0;
        for section in pending {
            if !current.is_empty() && current_cost + section.cost > self.batch_token_limit {
                batches.push(std::mem::take(&mut current));
                current_cost = 0;
            }
            if section.cost > self.batch_token_limit {
                warn!(
                    "Section {} is estimated at {} units, above the batch limit {}",
                    section.key, section.cost, self.batch_token_limit
                );
            }
            current_cost += section.cost;
            current.push(section);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn run_batch(&self, batch: Vec<PendingSection>) -> SyncResult<BTreeMap<String, String>> {
        let payload = BatchPayload {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            sections: batch.into_iter().map(|s| (s.key, s.request)).collect(),
        };
        let turns = build_batch_prompt(&payload)?;
        let response = self.generator.generate(&turns, self.max_output_tokens).await?;
        let mut translations = parse_translations(&response)?;
        translations.retain(|key, _| payload.sections.contains_key(key));
        Ok(translations)
    }

    /// Run every batch, collecting translations and counting failed batches
    async fn run_batches(&self, pending: Vec<PendingSection>) -> (BTreeMap<String, String>, usize, usize) {
        let batches = self.plan_batches(pending);
        let total = batches.len();
        let mut results = BTreeMap::new();
        let mut failed = 0;
        for (i, batch) in batches.into_iter().enumerate() {
            let size = batch.len();
            info!(
                "🤖 {} batch {}/{} ({} sections)",
                self.generator.provider_name(),
                i + 1,
                total,
                size
            );
            match self.run_batch(batch).await {
                Ok(translations) => results.extend(translations),
                Err(e) => {
                    warn!("❌ Batch {}/{} failed: {}", i + 1, total, e);
                    failed += 1;
                }
            }
        }
        (results, total, failed)
    }

    /// Translate every matched added or modified record in place
    ///
    /// Deleted and unmatched records are never sent, nor are records that
    /// already carry a translation from an earlier run.
    pub async fn translate(&self, records: &mut [MatchRecord]) -> TranslationReport {
        let pending: Vec<PendingSection> = records
            .iter()
            .filter(|r| r.needs_translation() && r.target_new_content.is_none())
            .map(|r| {
                let request = match r.source_operation {
                    Operation::Modified => SectionRequest {
                        operation: Operation::Modified,
                        source_new: r.source_content.clone(),
                        source_old: r.previous_content.clone(),
                        target_current: Some(r.target_content.clone()),
                    },
                    _ => SectionRequest {
                        operation: Operation::Added,
                        source_new: r.source_content.clone(),
                        source_old: None,
                        target_current: None,
                    },
                };
                self.pending(&r.section_key, request)
            })
            .collect();

        if pending.is_empty() {
            return TranslationReport::default();
        }

        let (mut results, batches, failed_batches) = self.run_batches(pending).await;
        let mut report = TranslationReport {
            batches,
            failed_batches,
            ..Default::default()
        };
        for record in records
            .iter_mut()
            .filter(|r| r.needs_translation() && r.target_new_content.is_none())
        {
            match results.remove(&record.section_key) {
                Some(content) => {
                    record.set_translation(content);
                    report.translated += 1;
                }
                None => report.missing.push(record.section_key.clone()),
            }
        }
        report
    }

    /// Translate a whole new document section by section
    ///
    /// Fails if any section is left without a translation; a partially
    /// translated new document is never produced.
    pub async fn translate_document(&self, text: &str, tree: &SectionTree) -> SyncResult<String> {
        let entries = tree.entries();
        let pending: Vec<PendingSection> = entries
            .iter()
            .filter(|e| !e.body(text).trim().is_empty())
            .map(|e| {
                self.pending(
                    &e.key,
                    SectionRequest {
                        operation: Operation::Added,
                        source_new: e.body(text).to_string(),
                        source_old: None,
                        target_current: None,
                    },
                )
            })
            .collect();

        let (mut results, _, _) = self.run_batches(pending).await;
        let mut out = String::with_capacity(text.len());
        let mut missing = Vec::new();
        for entry in &entries {
            let body = entry.body(text);
            if body.trim().is_empty() {
                out.push_str(body);
                continue;
            }
            match results.remove(&entry.key) {
                Some(content) => out.push_str(&fit_trailing(&content, body)),
                None => missing.push(entry.key.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(SyncError::TranslationError(format!(
                "No translation for sections: {}",
                missing.join(", ")
            )));
        }
        Ok(out)
    }
}
