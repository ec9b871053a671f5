//! Source-to-target section matching
//!
//! Source and target documents are in different languages, so headings are
//! never byte-identical. Matching uses language-neutral heading tokens
//! (identifiers, product names, numbers, `{#custom-anchor}` ids) as the
//! primary signal. When no heading clears the similarity threshold, the
//! section falls back to positional alignment: the target node at the same
//! index path as the section had in the pre-change source tree, provided
//! it sits at the same heading level. Anything else is recorded unmatched.
//!
//! Added sections have no counterpart yet; they are placed after the target
//! counterpart of the nearest preceding section that survived the edit.

use crate::change::{ClassifiedSection, Operation, SectionAnchor};
use crate::config::SyncConfig;
use crate::section::{PREAMBLE_KEY, SectionEntry, SectionTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Where a record lands in the target document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum TargetLocation {
    /// Replace (or remove) the body of this target section
    Section(String),
    /// Insert after the body of this target section
    After(String),
    Unmatched,
}

/// How the target location was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Heading,
    Positional,
    Preamble,
    Unmatched,
}

/// Association between a classified source section and its target location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub section_key: String,
    pub source_operation: Operation,
    pub source_heading_path: Vec<String>,
    /// Index path in the source tree; orders insertions that share an anchor
    #[serde(default)]
    pub source_position: Vec<usize>,
    pub source_content: String,
    pub previous_content: Option<String>,
    pub target: TargetLocation,
    pub target_heading_path: Vec<String>,
    /// Existing target body; empty for insertions and unmatched records
    pub target_content: String,
    /// Translated replacement; always `None` for deleted sections
    pub target_new_content: Option<String>,
    pub method: MatchMethod,
    pub score: f32,
}

impl MatchRecord {
    pub fn is_matched(&self) -> bool {
        self.target != TargetLocation::Unmatched
    }

    /// Matched added or modified records go to the translation service
    pub fn needs_translation(&self) -> bool {
        self.is_matched() && self.source_operation != Operation::Deleted
    }

    /// Record translated content; ignored for deleted sections
    pub fn set_translation(&mut self, content: String) {
        if self.source_operation != Operation::Deleted {
            self.target_new_content = Some(content);
        }
    }
}

/// Records produced for one file, plus sections cut by the section ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub records: Vec<MatchRecord>,
    pub dropped: Vec<String>,
}

impl MatchOutcome {
    pub fn matched_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_matched()).count()
    }

    pub fn unmatched(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| !r.is_matched())
            .map(|r| r.section_key.as_str())
            .collect()
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "how", "in", "into", "is", "of", "on",
    "or", "the", "to", "use", "using", "with",
];

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_.\-]*").expect("valid word regex"))
}

fn anchor_pattern() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| Regex::new(r"\{#([^}\s]+)\}").expect("valid anchor regex"))
}

/// Explicit `{#id}` anchor of a heading, if any
fn custom_anchor(title: &str) -> Option<String> {
    anchor_pattern()
        .captures(title)
        .map(|caps| caps[1].to_ascii_lowercase())
}

/// Language-neutral tokens of a heading
pub fn neutral_tokens(title: &str) -> BTreeSet<String> {
    let without_anchor = anchor_pattern().replace_all(title, " ");
    word_pattern()
        .find_iter(&without_anchor)
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_ascii_lowercase())
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Similarity of two headings in [0, 1]
///
/// Identical titles and identical custom anchors score 1; differing custom
/// anchors score 0. Otherwise the Dice coefficient of the neutral tokens.
pub fn title_similarity(a: &str, b: &str) -> f32 {
    let (a_norm, b_norm) = (a.trim().to_lowercase(), b.trim().to_lowercase());
    if !a_norm.is_empty() && a_norm == b_norm {
        return 1.0;
    }
    if let (Some(x), Some(y)) = (custom_anchor(a), custom_anchor(b)) {
        return if x == y { 1.0 } else { 0.0 };
    }
    let (ta, tb) = (neutral_tokens(a), neutral_tokens(b));
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    (2 * shared) as f32 / (ta.len() + tb.len()) as f32
}

/// Mean title similarity of the ancestors, aligned from the nearest one
fn ancestor_similarity(source: &[String], target: &[String]) -> f32 {
    let a = &source[..source.len().saturating_sub(1)];
    let b = &target[..target.len().saturating_sub(1)];
    let pairs: Vec<f32> = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .map(|(x, y)| title_similarity(x, y))
        .collect();
    if pairs.is_empty() {
        0.0
    } else {
        pairs.iter().sum::<f32>() / pairs.len() as f32
    }
}

fn position_distance(a: &[usize], b: &[usize]) -> usize {
    let common = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let tail_gap = match (a.get(common), b.get(common)) {
        (Some(x), Some(y)) => x.abs_diff(*y),
        _ => 0,
    };
    (a.len() - common) + (b.len() - common) + tail_gap
}

/// Aligns classified source sections with a target section tree
#[derive(Debug, Clone)]
pub struct SectionMatcher {
    threshold: f32,
    max_sections: usize,
}

impl SectionMatcher {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_limits(config.heading_similarity_threshold, config.max_sections_per_file)
    }

    pub fn with_limits(threshold: f32, max_sections: usize) -> Self {
        Self {
            threshold,
            max_sections,
        }
    }

    /// Apply the per-file section ceiling
    ///
    /// Added and deleted sections are kept first, then modified sections in
    /// file order while the ceiling allows. Returns the kept sections in
    /// their original order and the keys that were cut.
    pub fn select_within_ceiling<'a>(
        &self,
        sections: &'a [ClassifiedSection],
    ) -> (Vec<&'a ClassifiedSection>, Vec<String>) {
        if sections.len() <= self.max_sections {
            return (sections.iter().collect(), Vec::new());
        }

        let structural: Vec<usize> = sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.source_operation != Operation::Modified)
            .map(|(i, _)| i)
            .collect();
        let modified = sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.source_operation == Operation::Modified)
            .map(|(i, _)| i);

        let mut keep: BTreeSet<usize> = structural.into_iter().take(self.max_sections).collect();
        let room = self.max_sections - keep.len();
        keep.extend(modified.take(room));

        let dropped = sections
            .iter()
            .enumerate()
            .filter(|(i, _)| !keep.contains(i))
            .map(|(_, s)| s.section_key.clone())
            .collect();
        (keep.into_iter().map(|i| &sections[i]).collect(), dropped)
    }

    /// Best unclaimed target entry at the same level by heading similarity
    fn heading_match<'t>(
        &self,
        heading_path: &[String],
        level: usize,
        position: &[usize],
        entries: &'t [SectionEntry],
        claimed: &HashSet<String>,
    ) -> Option<(&'t SectionEntry, f32)> {
        let title = heading_path.last()?;
        let mut best: Option<(&SectionEntry, f32, f32, usize)> = None;
        for entry in entries {
            if entry.is_preamble() || entry.level != level || claimed.contains(&entry.key) {
                continue;
            }
            let score = title_similarity(title, &entry.title);
            if score < self.threshold {
                continue;
            }
            let context = ancestor_similarity(heading_path, &entry.heading_path);
            let distance = position_distance(position, &entry.position);
            let better = match best {
                None => true,
                Some((_, s, c, d)) => {
                    score > s || (score == s && (context > c || (context == c && distance < d)))
                }
            };
            if better {
                best = Some((entry, score, context, distance));
            }
        }
        best.map(|(entry, score, _, _)| (entry, score))
    }

    /// Target entry at the same index path and level, if unclaimed
    fn positional_match<'t>(
        &self,
        level: usize,
        position: &[usize],
        target_tree: &SectionTree,
        entries: &'t [SectionEntry],
        claimed: &HashSet<String>,
    ) -> Option<&'t SectionEntry> {
        let node = target_tree.node_at(position)?;
        if node.level != level || claimed.contains(&node.key) {
            return None;
        }
        entries.iter().find(|e| e.key == node.key)
    }

    fn resolve_anchor<'t>(
        &self,
        anchor: &SectionAnchor,
        resolved: &[(String, String)],
        target_tree: &SectionTree,
        entries: &'t [SectionEntry],
    ) -> Option<&'t SectionEntry> {
        if anchor.key == PREAMBLE_KEY {
            return entries.first();
        }
        if let Some((_, target_key)) = resolved.iter().find(|(source, _)| source == &anchor.key) {
            return entries.iter().find(|e| &e.key == target_key);
        }
        let none = HashSet::new();
        self.heading_match(&anchor.heading_path, anchor.level, &anchor.position, entries, &none)
            .map(|(entry, _)| entry)
            .or_else(|| self.positional_match(anchor.level, &anchor.position, target_tree, entries, &none))
    }

    /// Match a file's classified sections against the target document
    pub fn match_sections(
        &self,
        sections: &[ClassifiedSection],
        target_tree: &SectionTree,
        target_text: &str,
    ) -> MatchOutcome {
        let (selected, dropped) = self.select_within_ceiling(sections);
        if !dropped.is_empty() {
            info!(
                "Section ceiling {} reached, {} modified sections left for a later run",
                self.max_sections,
                dropped.len()
            );
        }

        let entries = target_tree.entries();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut located: Vec<Option<(TargetLocation, MatchMethod, f32, usize)>> =
            vec![None; selected.len()];
        // source key -> target key for sections that already hold a target
        let mut resolved: Vec<(String, String)> = Vec::new();

        let index_of = |key: &str| entries.iter().position(|e| e.key == key);

        // Preamble and heading matches claim targets first
        for (i, section) in selected.iter().enumerate() {
            if section.source_operation == Operation::Added {
                continue;
            }
            if section.section_key == PREAMBLE_KEY {
                claimed.insert(PREAMBLE_KEY.to_string());
                located[i] = Some((TargetLocation::Section(PREAMBLE_KEY.to_string()), MatchMethod::Preamble, 1.0, 0));
                resolved.push((section.section_key.clone(), PREAMBLE_KEY.to_string()));
                continue;
            }
            if let Some((entry, score)) =
                self.heading_match(&section.heading_path, section.level, &section.position, &entries, &claimed)
            {
                claimed.insert(entry.key.clone());
                let idx = index_of(&entry.key).unwrap_or(0);
                located[i] = Some((TargetLocation::Section(entry.key.clone()), MatchMethod::Heading, score, idx));
                resolved.push((section.section_key.clone(), entry.key.clone()));
            }
        }

        // Positional fallback for the rest
        for (i, section) in selected.iter().enumerate() {
            if section.source_operation == Operation::Added || located[i].is_some() {
                continue;
            }
            if let Some(entry) =
                self.positional_match(section.level, &section.position, target_tree, &entries, &claimed)
            {
                claimed.insert(entry.key.clone());
                let idx = index_of(&entry.key).unwrap_or(0);
                located[i] = Some((TargetLocation::Section(entry.key.clone()), MatchMethod::Positional, 0.0, idx));
                resolved.push((section.section_key.clone(), entry.key.clone()));
            } else {
                debug!("No target found for {}", section.section_key);
            }
        }

        // Insertions after the counterpart of their anchor
        for (i, section) in selected.iter().enumerate() {
            if section.source_operation != Operation::Added {
                continue;
            }
            let Some(anchor) = &section.anchor else {
                continue;
            };
            if let Some(entry) = self.resolve_anchor(anchor, &resolved, target_tree, &entries) {
                let idx = index_of(&entry.key).unwrap_or(0);
                located[i] = Some((TargetLocation::After(entry.key.clone()), MatchMethod::Positional, 0.0, idx));
            }
        }

        let records = selected
            .iter()
            .zip(located)
            .map(|(section, location)| {
                let (target, method, score, entry) = match location {
                    Some((target, method, score, idx)) => (target, method, score, entries.get(idx)),
                    None => (TargetLocation::Unmatched, MatchMethod::Unmatched, 0.0, None),
                };
                let target_content = match (&target, entry) {
                    (TargetLocation::Section(_), Some(e)) => e.body(target_text).to_string(),
                    _ => String::new(),
                };
                MatchRecord {
                    section_key: section.section_key.clone(),
                    source_operation: section.source_operation,
                    source_heading_path: section.heading_path.clone(),
                    source_position: section.position.clone(),
                    source_content: section.source_content.clone(),
                    previous_content: section.previous_content.clone(),
                    target_heading_path: entry.map(|e| e.heading_path.clone()).unwrap_or_default(),
                    target,
                    target_content,
                    target_new_content: None,
                    method,
                    score,
                }
            })
            .collect();

        MatchOutcome { records, dropped }
    }
}
