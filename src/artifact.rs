//! Staging artifacts
//!
//! Intermediate results of each file are written to the staging directory
//! between stages, so a run can be inspected afterwards or resumed. Every
//! artifact is wrapped in an envelope naming the format version, the stage
//! and the source path; a file that does not carry the expected envelope is
//! reported as corrupt rather than silently reinterpreted.

use crate::error::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pipeline stage an artifact belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Per-section diff of a modified document
    ClassifiedSections,
    /// Source-to-target matches, later carrying translations
    MatchRecords,
    /// Merged document as written to the target tree
    Written,
}

impl Stage {
    fn file_suffix(&self) -> &'static str {
        match self {
            Stage::ClassifiedSections => "source-diff-dict",
            Stage::MatchRecords => "match-source-diff-to-target",
            Stage::Written => "written",
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    stage: Stage,
    source_path: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    stage: Stage,
    source_path: String,
    payload: T,
}

/// Staging directory keyed by (source path, stage)
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub const VERSION: u32 = 1;

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of an artifact
    ///
    /// `docs/guide/setup.md` at the classified stage becomes
    /// `docs-guide-setup-source-diff-dict.json`. Distinct paths never share
    /// a file: `%` and `-` are escaped before `/` becomes `-`, so
    /// `a-b.md` and `a/b.md` land on `a%2Db-...` and `a-b-...`.
    pub fn artifact_path(&self, source_path: &str, stage: Stage) -> PathBuf {
        let stem = source_path.strip_suffix(".md").unwrap_or(source_path);
        let mut name = String::with_capacity(stem.len());
        for c in stem.chars() {
            match c {
                '%' => name.push_str("%25"),
                '-' => name.push_str("%2D"),
                '/' => name.push('-'),
                c => name.push(c),
            }
        }
        self.root
            .join(format!("{}-{}.json", name, stage.file_suffix()))
    }

    /// Remove every artifact of previous runs
    pub async fn clear(&self) -> SyncResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SyncError::ArtifactError(format!(
                    "Failed to clear {}: {}",
                    self.root.display(),
                    e
                )));
            }
        }
        tokio::fs::create_dir_all(&self.root).await?;
        debug!("Cleared staging directory {}", self.root.display());
        Ok(())
    }

    /// Persist a stage result, replacing any earlier one
    pub async fn save<T: Serialize>(&self, source_path: &str, stage: Stage, payload: &T) -> SyncResult<PathBuf> {
        let path = self.artifact_path(source_path, stage);
        let envelope = EnvelopeRef {
            version: Self::VERSION,
            stage,
            source_path,
            payload,
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("💾 Saved {}", path.display());
        Ok(path)
    }

    /// Load a stage result
    ///
    /// Returns `Ok(None)` when no artifact exists, and `ArtifactError` when
    /// one exists but cannot be read back for this path and stage.
    pub async fn load<T: DeserializeOwned>(&self, source_path: &str, stage: Stage) -> SyncResult<Option<T>> {
        let path = self.artifact_path(source_path, stage);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::ArtifactError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            SyncError::ArtifactError(format!("Corrupt artifact {}: {}", path.display(), e))
        })?;
        if envelope.version != Self::VERSION {
            return Err(SyncError::ArtifactError(format!(
                "{} has format version {}, expected {}",
                path.display(),
                envelope.version,
                Self::VERSION
            )));
        }
        if envelope.stage != stage || envelope.source_path != source_path {
            return Err(SyncError::ArtifactError(format!(
                "{} belongs to {} ({:?}), not {} ({:?})",
                path.display(),
                envelope.source_path,
                envelope.stage,
                source_path,
                stage
            )));
        }
        Ok(Some(envelope.payload))
    }
}
