//! Error types for the synchronization pipeline

use thiserror::Error;

/// Errors raised by the synchronization pipeline and its collaborators
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid configuration (bad TOML, missing token, unknown repo)
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Transport failure talking to a remote service
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Version-control collaborator returned something unusable
    #[error("Version control error: {0}")]
    VcsError(String),
    /// Document could not be parsed into a section tree
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Unified patch is malformed or does not fit the document
    #[error("Patch error: {0}")]
    PatchError(String),
    /// Translation service failed or returned no usable content
    #[error("Translation error: {0}")]
    TranslationError(String),
    /// Staging artifact is corrupt, stale or unreadable
    #[error("Artifact error: {0}")]
    ArtifactError(String),
    /// Final write to the target tree failed
    #[error("Write error: {0}")]
    WriteError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the failure came from a remote collaborator and may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkError(_) | SyncError::VcsError(_) | SyncError::TranslationError(_)
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::NetworkError(err.to_string())
    }
}

/// Result type for pipeline operations
pub type SyncResult<T> = Result<T, SyncError>;
