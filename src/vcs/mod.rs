//! Version-control collaborator
//!
//! The pipeline only reads from the source repository: the change set of a
//! change request, and file content at a revision. It never mutates the
//! source tree.

pub mod github;
pub mod memory;

use crate::change::ChangeSet;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;

pub use github::{GitHubChangeSource, parse_pull_request_url};
pub use memory::InMemoryChangeSource;

/// Read access to the change request and the source tree
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Every touched path of the change request with its patch
    async fn change_set(&self) -> SyncResult<ChangeSet>;

    /// Raw file content at a revision
    async fn file_bytes(&self, path: &str, revision: &str) -> SyncResult<Vec<u8>>;

    /// File content at a revision, decoded as UTF-8
    async fn file_text(&self, path: &str, revision: &str) -> SyncResult<String> {
        let bytes = self.file_bytes(path, revision).await?;
        String::from_utf8(bytes).map_err(|_| {
            SyncError::VcsError(format!("{} at {} is not valid UTF-8", path, revision))
        })
    }

    /// Name used in logs
    fn source_name(&self) -> &str;
}
