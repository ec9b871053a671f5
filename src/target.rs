//! Local target documentation tree
//!
//! All reads and writes of the target checkout go through `TargetTree`.
//! Paths are repository-relative; anything that would escape the root is
//! rejected before touching the filesystem.

use crate::error::{SyncError, SyncResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// `dir/.name.tmp` next to `dir/name`
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

#[derive(Debug, Clone)]
pub struct TargetTree {
    root: PathBuf,
}

impl TargetTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a repository-relative path
    pub fn resolve(&self, relative: &str) -> SyncResult<PathBuf> {
        let path = Path::new(relative);
        let safe = !relative.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(SyncError::WriteError(format!(
                "Refusing path outside the target tree: {}",
                relative
            )));
        }
        Ok(self.root.join(path))
    }

    /// Document text, or `None` if the target has no such file
    pub async fn read(&self, relative: &str) -> SyncResult<Option<String>> {
        match tokio::fs::read_to_string(self.resolve(relative)?).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a file as a whole
    ///
    /// Content goes to a sibling temporary file that is renamed over the
    /// destination, so a failed write leaves the previous file intact.
    pub async fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> SyncResult<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::WriteError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let tmp = temp_sibling(&path);
        let result = match tokio::fs::write(&tmp, content).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::WriteError(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }

    /// Remove a file; `Ok(false)` when it was already absent
    pub async fn remove(&self, relative: &str) -> SyncResult<bool> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::WriteError(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let tree = TargetTree::new(dir.path());
        tree.write("a/b/c.md", "# 标题\n").await.unwrap();
        assert_eq!(tree.read("a/b/c.md").await.unwrap().as_deref(), Some("# 标题\n"));
        assert!(tree.read("missing.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temporary_file() {
        let dir = TempDir::new().unwrap();
        let tree = TargetTree::new(dir.path());
        tree.write("docs/a.md", "# 旧\n").await.unwrap();
        tree.write("docs/a.md", "# 新\n").await.unwrap();

        assert_eq!(tree.read("docs/a.md").await.unwrap().as_deref(), Some("# 新\n"));
        let names: Vec<String> = std::fs::read_dir(dir.path().join("docs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md"]);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_destination_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let tree = TargetTree::new(dir.path());
        // A directory in the way makes the final rename fail
        std::fs::create_dir_all(dir.path().join("docs/a.md/inner")).unwrap();

        let result = tree.write("docs/a.md", "# 新\n").await;
        assert!(matches!(result, Err(SyncError::WriteError(_))));
        assert!(dir.path().join("docs/a.md/inner").is_dir());
        assert!(!dir.path().join("docs/.a.md.tmp").exists());
    }

    #[test]
    fn test_temp_sibling() {
        assert_eq!(
            temp_sibling(Path::new("/root/docs/a.md")),
            PathBuf::from("/root/docs/.a.md.tmp")
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let tree = TargetTree::new(dir.path());
        tree.write("x.md", "x").await.unwrap();
        assert!(tree.remove("x.md").await.unwrap());
        assert!(!tree.remove("x.md").await.unwrap());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let tree = TargetTree::new("/tmp/root");
        assert!(tree.resolve("../etc/passwd").is_err());
        assert!(tree.resolve("/etc/passwd").is_err());
        assert!(tree.resolve("").is_err());
        assert_eq!(tree.resolve("docs/a.md").unwrap(), PathBuf::from("/tmp/root/docs/a.md"));
    }
}
