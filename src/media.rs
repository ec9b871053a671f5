//! Media synchronization
//!
//! Binary assets are mirrored byte for byte from the head revision of the
//! source repository. Removals run before copies so that a rename never
//! ends with the new file deleted.

use crate::change::{ChangeSet, FileChange, Operation};
use crate::error::SyncResult;
use crate::target::TargetTree;
use crate::vcs::ChangeSource;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaReport {
    pub copied: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct MediaSynchronizer<'a> {
    source: &'a dyn ChangeSource,
    target: &'a TargetTree,
}

impl<'a> MediaSynchronizer<'a> {
    pub fn new(source: &'a dyn ChangeSource, target: &'a TargetTree) -> Self {
        Self { source, target }
    }

    async fn copy(&self, change: &FileChange, revision: &str) -> SyncResult<()> {
        let bytes = self.source.file_bytes(&change.path, revision).await?;
        self.target.write(&change.path, bytes).await
    }

    /// Apply media changes: deletions first, then additions and modifications
    pub async fn sync(&self, change_set: &ChangeSet, added: &[FileChange], changed: &[FileChange]) -> MediaReport {
        let mut report = MediaReport::default();

        for change in changed.iter().filter(|c| c.operation == Operation::Deleted) {
            match self.target.remove(&change.path).await {
                Ok(true) => {
                    info!("🗑️  Removed media {}", change.path);
                    report.removed.push(change.path.clone());
                }
                Ok(false) => info!("Media {} already absent", change.path),
                Err(e) => {
                    warn!("❌ Failed to remove {}: {}", change.path, e);
                    report.failed.push(change.path.clone());
                }
            }
        }

        let copies = added
            .iter()
            .chain(changed.iter().filter(|c| c.operation != Operation::Deleted));
        for change in copies {
            match self.copy(change, &change_set.head_revision).await {
                Ok(()) => {
                    info!("🖼️  Copied media {}", change.path);
                    report.copied.push(change.path.clone());
                }
                Err(e) => {
                    warn!("❌ Failed to copy {}: {}", change.path, e);
                    report.failed.push(change.path.clone());
                }
            }
        }
        report
    }
}
