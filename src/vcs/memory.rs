//! In-memory change source
//!
//! Serves a fixed change set and file contents from memory, so the pipeline
//! can run end to end without network access.

use super::ChangeSource;
use crate::change::ChangeSet;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct InMemoryChangeSource {
    change_set: ChangeSet,
    /// (revision, path) → content
    files: HashMap<(String, String), Vec<u8>>,
}

impl InMemoryChangeSource {
    pub fn new(change_set: ChangeSet) -> Self {
        Self {
            change_set,
            files: HashMap::new(),
        }
    }

    pub fn with_file(self, revision: &str, path: &str, text: &str) -> Self {
        self.with_bytes(revision, path, text.as_bytes().to_vec())
    }

    pub fn with_bytes(mut self, revision: &str, path: &str, bytes: Vec<u8>) -> Self {
        self.files
            .insert((revision.to_string(), path.to_string()), bytes);
        self
    }
}

#[async_trait]
impl ChangeSource for InMemoryChangeSource {
    async fn change_set(&self) -> SyncResult<ChangeSet> {
        Ok(self.change_set.clone())
    }

    async fn file_bytes(&self, path: &str, revision: &str) -> SyncResult<Vec<u8>> {
        self.files
            .get(&(revision.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| SyncError::VcsError(format!("{} not found at {}", path, revision)))
    }

    fn source_name(&self) -> &str {
        "In-memory"
    }
}
