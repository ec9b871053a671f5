//! Change classification
//!
//! Paths are routed into six disjoint buckets. Ignored paths are dropped,
//! special index files and media are routed by name and extension before
//! the operation is considered, and modified documents are further split
//! into per-section operations by diffing their before/after section trees.

use super::{ChangeSet, FileChange, Operation, patch};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::section::{SectionEntry, SectionParser, SectionTree};
use crate::vcs::ChangeSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// The surviving section an added section follows in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionAnchor {
    pub key: String,
    pub heading_path: Vec<String>,
    pub level: usize,
    /// Index path in the pre-change tree
    pub position: Vec<usize>,
}

/// A section annotated with what the change did to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedSection {
    pub section_key: String,
    pub source_operation: Operation,
    pub heading_path: Vec<String>,
    pub level: usize,
    /// Post-change body; empty for deleted sections
    pub source_content: String,
    /// Pre-change body for modified and deleted sections
    pub previous_content: Option<String>,
    /// Index path in the pre-change tree (post-change tree for added sections)
    pub position: Vec<usize>,
    /// Only set for added sections
    pub anchor: Option<SectionAnchor>,
}

/// Classified sections of one file as persisted between stages
///
/// Resolved once by the orchestrator with `into_sections`; downstream code
/// only ever sees the section list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum FileSectionsPayload {
    Sections(Vec<ClassifiedSection>),
    Wrapped {
        sections: Vec<ClassifiedSection>,
        original_hierarchy: SectionTree,
        current_hierarchy: SectionTree,
    },
}

impl FileSectionsPayload {
    pub fn sections(&self) -> &[ClassifiedSection] {
        match self {
            FileSectionsPayload::Sections(sections) => sections,
            FileSectionsPayload::Wrapped { sections, .. } => sections,
        }
    }

    pub fn into_sections(self) -> Vec<ClassifiedSection> {
        match self {
            FileSectionsPayload::Sections(sections) => sections,
            FileSectionsPayload::Wrapped { sections, .. } => sections,
        }
    }
}

/// Path buckets of one change set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedChanges {
    pub added_files: Vec<FileChange>,
    /// Modified documents, before section decomposition
    pub modified_files: Vec<FileChange>,
    pub deleted_files: Vec<FileChange>,
    pub special_files: Vec<FileChange>,
    pub added_media: Vec<FileChange>,
    /// Modified and deleted media
    pub changed_media: Vec<FileChange>,
}

impl ClassifiedChanges {
    pub fn total(&self) -> usize {
        self.added_files.len()
            + self.modified_files.len()
            + self.deleted_files.len()
            + self.special_files.len()
            + self.added_media.len()
            + self.changed_media.len()
    }
}

/// Routes touched paths into buckets using the configured path lists
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    ignore_files: Vec<String>,
    special_files: Vec<String>,
    document_extensions: Vec<String>,
    media_extensions: Vec<String>,
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

impl ChangeClassifier {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            ignore_files: config.ignore_files.clone(),
            special_files: config.special_files.clone(),
            document_extensions: config
                .document_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            media_extensions: config
                .media_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    fn listed(list: &[String], path: &str) -> bool {
        let name = file_name(path);
        list.iter().any(|entry| entry == path || entry == name)
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        Self::listed(&self.ignore_files, path)
    }

    pub fn is_special(&self, path: &str) -> bool {
        Self::listed(&self.special_files, path)
    }

    pub fn is_media(&self, path: &str) -> bool {
        extension(path).is_some_and(|ext| self.media_extensions.contains(&ext))
    }

    pub fn is_document(&self, path: &str) -> bool {
        extension(path).is_some_and(|ext| self.document_extensions.contains(&ext))
    }

    /// Partition the change set into the six path buckets
    pub fn partition(&self, change_set: &ChangeSet) -> ClassifiedChanges {
        let mut buckets = ClassifiedChanges::default();
        for change in &change_set.files {
            let path = change.path.as_str();
            if self.is_ignored(path) {
                debug!("Ignoring {}", path);
                continue;
            }
            if self.is_special(path) {
                buckets.special_files.push(change.clone());
            } else if self.is_media(path) {
                match change.operation {
                    Operation::Added => buckets.added_media.push(change.clone()),
                    Operation::Modified | Operation::Deleted => {
                        buckets.changed_media.push(change.clone())
                    }
                }
            } else if self.is_document(path) {
                match change.operation {
                    Operation::Added => buckets.added_files.push(change.clone()),
                    Operation::Modified => buckets.modified_files.push(change.clone()),
                    Operation::Deleted => buckets.deleted_files.push(change.clone()),
                }
            } else {
                debug!("Skipping {}: neither document nor media", path);
            }
        }
        buckets
    }

    /// Decompose a modified document into per-section operations
    ///
    /// The post-change text is fetched at the head revision; the pre-change
    /// text is rebuilt from the patch, or fetched at the base revision when
    /// the patch is missing or does not apply. Returns `None` when the edit
    /// touched no section content, in which case the file drops out of the
    /// modified bucket.
    pub async fn classify_modified(
        &self,
        change: &FileChange,
        change_set: &ChangeSet,
        source: &dyn ChangeSource,
        parser: &dyn SectionParser,
    ) -> SyncResult<Option<FileSectionsPayload>> {
        let after = source
            .file_text(&change.path, &change_set.head_revision)
            .await?;
        let before = match patch::reverse_apply(&after, &change.patch_text) {
            Ok(before) => before,
            Err(e) => {
                warn!(
                    "Could not rebuild {} from its patch ({}), fetching base revision",
                    change.path, e
                );
                source
                    .file_text(&change.path, &change_set.base_revision)
                    .await?
            }
        };

        let original_hierarchy = parser.parse(&before)?;
        let current_hierarchy = parser.parse(&after)?;
        let sections = classify_sections(&before, &original_hierarchy, &after, &current_hierarchy);
        if sections.is_empty() {
            return Ok(None);
        }
        Ok(Some(FileSectionsPayload::Wrapped {
            sections,
            original_hierarchy,
            current_hierarchy,
        }))
    }
}

/// Collapse whitespace so layout-only edits compare equal
fn normalized(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Diff two section trees of the same document
///
/// Sections whose body is unchanged apart from whitespace are not emitted.
/// Added and modified sections come first in post-change order, followed by
/// deleted sections in pre-change order.
pub fn classify_sections(
    before_text: &str,
    before_tree: &SectionTree,
    after_text: &str,
    after_tree: &SectionTree,
) -> Vec<ClassifiedSection> {
    let before_entries = before_tree.entries();
    let after_entries = after_tree.entries();
    let before_by_key: HashMap<&str, &SectionEntry> =
        before_entries.iter().map(|e| (e.key.as_str(), e)).collect();
    let after_keys: HashMap<&str, &SectionEntry> =
        after_entries.iter().map(|e| (e.key.as_str(), e)).collect();

    let mut sections = Vec::new();
    let mut last_surviving: Option<&SectionEntry> = None;

    for entry in &after_entries {
        match before_by_key.get(entry.key.as_str()) {
            Some(previous) => {
                let old_body = previous.body(before_text);
                let new_body = entry.body(after_text);
                if normalized(old_body) != normalized(new_body) {
                    sections.push(ClassifiedSection {
                        section_key: entry.key.clone(),
                        source_operation: Operation::Modified,
                        heading_path: entry.heading_path.clone(),
                        level: entry.level,
                        source_content: new_body.to_string(),
                        previous_content: Some(old_body.to_string()),
                        position: previous.position.clone(),
                        anchor: None,
                    });
                }
                last_surviving = Some(previous);
            }
            None => {
                sections.push(ClassifiedSection {
                    section_key: entry.key.clone(),
                    source_operation: Operation::Added,
                    heading_path: entry.heading_path.clone(),
                    level: entry.level,
                    source_content: entry.body(after_text).to_string(),
                    previous_content: None,
                    position: entry.position.clone(),
                    anchor: last_surviving.map(|anchor| SectionAnchor {
                        key: anchor.key.clone(),
                        heading_path: anchor.heading_path.clone(),
                        level: anchor.level,
                        position: anchor.position.clone(),
                    }),
                });
            }
        }
    }

    for entry in &before_entries {
        if !after_keys.contains_key(entry.key.as_str()) {
            sections.push(ClassifiedSection {
                section_key: entry.key.clone(),
                source_operation: Operation::Deleted,
                heading_path: entry.heading_path.clone(),
                level: entry.level,
                source_content: String::new(),
                previous_content: Some(entry.body(before_text).to_string()),
                position: entry.position.clone(),
                anchor: None,
            });
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{MarkdownSectionParser, PREAMBLE_KEY};
    use crate::vcs::InMemoryChangeSource;

    fn classifier() -> ChangeClassifier {
        ChangeClassifier::new(&SyncConfig::default())
    }

    fn trees(before: &str, after: &str) -> (SectionTree, SectionTree) {
        let parser = MarkdownSectionParser::new();
        (parser.parse(before).unwrap(), parser.parse(after).unwrap())
    }

    // ========== Partition Tests ==========

    #[test]
    fn test_partition_buckets() {
        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![
                FileChange::new("new.md", Operation::Added, ""),
                FileChange::new("docs/guide.md", Operation::Modified, "@@ -1 +1 @@\n-a\n+b"),
                FileChange::new("old.md", Operation::Deleted, ""),
                FileChange::new("TOC.md", Operation::Modified, ""),
                FileChange::new("media/arch.png", Operation::Added, ""),
                FileChange::new("media/flow.SVG", Operation::Modified, ""),
                FileChange::new("media/gone.jpg", Operation::Deleted, ""),
                FileChange::new("TOC-tidb-cloud.md", Operation::Modified, ""),
                FileChange::new("scripts/run.py", Operation::Modified, ""),
            ],
        );

        let buckets = classifier().partition(&change_set);
        assert_eq!(buckets.added_files.len(), 1);
        assert_eq!(buckets.modified_files[0].path, "docs/guide.md");
        assert_eq!(buckets.deleted_files[0].path, "old.md");
        assert_eq!(buckets.special_files[0].path, "TOC.md");
        assert_eq!(buckets.added_media[0].path, "media/arch.png");
        assert_eq!(buckets.changed_media.len(), 2);
        assert_eq!(buckets.total(), 7);
    }

    #[test]
    fn test_ignore_list_wins_over_every_bucket() {
        let mut config = SyncConfig::default();
        config.ignore_files.push("media/secret.png".to_string());
        config.special_files.push("media/secret.png".to_string());
        let change_set = ChangeSet::new(
            "b",
            "h",
            vec![FileChange::new("media/secret.png", Operation::Added, "")],
        );
        let buckets = ChangeClassifier::new(&config).partition(&change_set);
        assert_eq!(buckets.total(), 0);
    }

    #[test]
    fn test_special_file_routed_exclusively() {
        let change_set = ChangeSet::new(
            "b",
            "h",
            vec![FileChange::new("releases/TOC.md", Operation::Modified, "@@ -1 +1 @@\n-a\n+b")],
        );
        let buckets = classifier().partition(&change_set);
        assert_eq!(buckets.special_files.len(), 1);
        assert!(buckets.modified_files.is_empty());
    }

    // ========== Section Diff Tests ==========

    #[test]
    fn test_section_operations() {
        let before = "# Intro\n\nhello\n\n# Setup\n\nold steps\n\n# FAQ\n\nq\n";
        let after = "# Intro\n\nhello\n\n# Setup\n\nnew steps\n\n# Limits\n\nnone\n";
        let (bt, at) = trees(before, after);
        let sections = classify_sections(before, &bt, after, &at);

        let ops: Vec<(&str, Operation)> = sections
            .iter()
            .map(|s| (s.section_key.as_str(), s.source_operation))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("Setup", Operation::Modified),
                ("Limits", Operation::Added),
                ("FAQ", Operation::Deleted),
            ]
        );

        let setup = &sections[0];
        assert!(setup.source_content.contains("new steps"));
        assert!(setup.previous_content.as_ref().unwrap().contains("old steps"));
        assert_eq!(setup.position, vec![1]);

        let limits = &sections[1];
        assert_eq!(limits.anchor.as_ref().unwrap().key, "Setup");

        let faq = &sections[2];
        assert!(faq.source_content.is_empty());
        assert_eq!(faq.position, vec![2]);
    }

    #[test]
    fn test_whitespace_only_edit_yields_nothing() {
        let before = "# Intro\n\nsome   text\nhere\n";
        let after = "# Intro\n\nsome text here\n\n";
        let (bt, at) = trees(before, after);
        assert!(classify_sections(before, &bt, after, &at).is_empty());
    }

    #[test]
    fn test_added_first_section_anchors_on_preamble() {
        let before = "intro\n\n# A\n\na\n";
        let after = "intro\n\n# New\n\nn\n\n# A\n\na\n";
        let (bt, at) = trees(before, after);
        let sections = classify_sections(before, &bt, after, &at);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].anchor.as_ref().unwrap().key, PREAMBLE_KEY);
    }

    #[test]
    fn test_child_edit_leaves_parent_unclassified() {
        let before = "# A\n\nparent\n\n## B\n\nchild\n";
        let after = "# A\n\nparent\n\n## B\n\nchild changed\n";
        let (bt, at) = trees(before, after);
        let sections = classify_sections(before, &bt, after, &at);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_key, "A > B");
    }

    #[test]
    fn test_payload_resolution() {
        let section = ClassifiedSection {
            section_key: "A".to_string(),
            source_operation: Operation::Added,
            heading_path: vec!["A".to_string()],
            level: 1,
            source_content: "# A\n".to_string(),
            previous_content: None,
            position: vec![0],
            anchor: None,
        };
        let plain = FileSectionsPayload::Sections(vec![section.clone()]);
        let wrapped = FileSectionsPayload::Wrapped {
            sections: vec![section.clone()],
            original_hierarchy: SectionTree::default(),
            current_hierarchy: SectionTree::default(),
        };
        assert_eq!(plain.sections(), wrapped.sections());
        assert_eq!(wrapped.into_sections(), vec![section]);
    }

    // ========== Modified File Tests ==========

    #[tokio::test]
    async fn test_classify_modified_from_patch() {
        let after = "# Intro\n\nhello\n\n# Setup\n\nnew steps\n";
        let patch = "@@ -4,4 +4,4 @@\n \n # Setup\n \n-old steps\n+new steps\n";
        let change = FileChange::new("guide.md", Operation::Modified, patch);
        let change_set = ChangeSet::new("base", "head", vec![change.clone()]);
        let source = InMemoryChangeSource::new(change_set.clone()).with_file("head", "guide.md", after);

        let payload = classifier()
            .classify_modified(&change, &change_set, &source, &MarkdownSectionParser::new())
            .await
            .unwrap()
            .unwrap();
        let sections = payload.sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_key, "Setup");
        assert_eq!(sections[0].previous_content.as_deref(), Some("# Setup\n\nold steps\n"));
    }

    #[tokio::test]
    async fn test_classify_modified_falls_back_to_base_revision() {
        let before = "# Setup\n\nold\n";
        let after = "# Setup\n\nnew\n";
        let change = FileChange::new("guide.md", Operation::Modified, "");
        let change_set = ChangeSet::new("base", "head", vec![change.clone()]);
        let source = InMemoryChangeSource::new(change_set.clone())
            .with_file("base", "guide.md", before)
            .with_file("head", "guide.md", after);

        let payload = classifier()
            .classify_modified(&change, &change_set, &source, &MarkdownSectionParser::new())
            .await
            .unwrap();
        assert_eq!(payload.unwrap().sections()[0].source_operation, Operation::Modified);
    }
}
