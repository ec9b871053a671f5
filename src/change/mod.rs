//! Change sets and their classification
//!
//! A `ChangeSet` is produced once per run from a change request and is
//! read-only afterwards. The classifier partitions it into the buckets the
//! orchestrator processes, and decomposes modified documents into
//! per-section operations.

pub mod classifier;
pub mod patch;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::{
    ChangeClassifier, ClassifiedChanges, ClassifiedSection, FileSectionsPayload, SectionAnchor,
    classify_sections,
};

/// What happened to a path or a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Added => write!(f, "added"),
            Operation::Modified => write!(f, "modified"),
            Operation::Deleted => write!(f, "deleted"),
        }
    }
}

/// One touched path of a change request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub operation: Operation,
    /// Unified diff hunks; empty when the host omitted the patch
    pub patch_text: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, operation: Operation, patch_text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation,
            patch_text: patch_text.into(),
        }
    }
}

/// Identifies a change request on the hosting service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl ChangeRequest {
    /// `owner/repo` of the repository the request was opened against
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Every file touched by one change request, with the revisions it spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub base_revision: String,
    pub head_revision: String,
    pub files: Vec<FileChange>,
}

impl ChangeSet {
    pub fn new(
        base_revision: impl Into<String>,
        head_revision: impl Into<String>,
        files: Vec<FileChange>,
    ) -> Self {
        Self {
            base_revision: base_revision.into(),
            head_revision: head_revision.into(),
            files,
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn get(&self, path: &str) -> Option<&FileChange> {
        self.files.iter().find(|f| f.path == path)
    }
}
