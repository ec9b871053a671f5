//! Run configuration
//!
//! A `SyncConfig` is built once at startup (TOML file, then command-line
//! overrides) and handed to every component by reference. Nothing in the
//! crate reads configuration from ambient global state; secrets are the
//! only values taken from the environment, and only by the providers.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Translation backend selected once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepSeek,
    Gemini,
    Mock,
}

impl ProviderKind {
    pub fn parse(name: &str) -> SyncResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "gemini" => Ok(ProviderKind::Gemini),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(SyncError::ConfigError(format!(
                "Unsupported translation provider: {}",
                other
            ))),
        }
    }

    /// Content-unit ceiling per translation batch when the config does not set one
    pub fn default_batch_token_limit(&self) -> usize {
        match self {
            ProviderKind::DeepSeek => 20_000,
            ProviderKind::Gemini | ProviderKind::Mock => 8_000,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Mock => "mock",
        }
    }
}

/// `[provider]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: Option<String>,
    pub batch_token_limit: Option<usize>,
    pub max_output_tokens: usize,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            model: None,
            batch_token_limit: None,
            max_output_tokens: 8_000,
            temperature: 0.1,
        }
    }
}

impl ProviderConfig {
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    pub fn batch_token_limit(&self) -> usize {
        self.batch_token_limit
            .unwrap_or_else(|| self.kind.default_batch_token_limit())
    }
}

/// One `[[repositories]]` entry: a mirrored pair of documentation repos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// `owner/repo` the change requests are opened against
    pub source_repo: String,
    pub target_repo: String,
    pub target_root: PathBuf,
    pub source_language: String,
    pub target_language: String,
}

/// Immutable settings for one synchronization run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub source_language: String,
    pub target_language: String,
    /// Local checkout of the target documentation tree
    pub target_root: PathBuf,
    /// Directory holding staging artifacts
    pub staging_dir: PathBuf,
    /// Index documents (matched by file name) handled outside section sync
    pub special_files: Vec<String>,
    /// File names excluded from every bucket
    pub ignore_files: Vec<String>,
    pub document_extensions: Vec<String>,
    pub media_extensions: Vec<String>,
    /// Ceiling on estimated tokens of new source content per file
    pub source_token_limit: u64,
    /// Ceiling on matched sections sent for translation per file
    pub max_sections_per_file: usize,
    /// Minimum heading similarity for a heading-based match
    pub heading_similarity_threshold: f32,
    pub max_parallel_files: usize,
    /// Merge files even when some translation batches failed
    pub allow_partial_merge: bool,
    /// Reuse staging artifacts from a previous run instead of clearing them
    pub resume: bool,
    pub provider: ProviderConfig,
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_language: "English".to_string(),
            target_language: "Chinese".to_string(),
            target_root: PathBuf::from("."),
            staging_dir: PathBuf::from("temp_output"),
            special_files: vec!["TOC.md".to_string()],
            ignore_files: vec![
                "TOC-tidb-cloud.md".to_string(),
                "TOC-tidb-cloud-starter.md".to_string(),
                "TOC-tidb-cloud-essential.md".to_string(),
                "TOC-tidb-cloud-premium.md".to_string(),
            ],
            document_extensions: vec!["md".to_string()],
            media_extensions: ["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ico"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            source_token_limit: 5_000,
            max_sections_per_file: 120,
            heading_similarity_threshold: 0.5,
            max_parallel_files: 4,
            allow_partial_merge: false,
            resume: false,
            provider: ProviderConfig::default(),
            repositories: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: SyncConfig = toml::from_str(text)
            .map_err(|e| SyncError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.max_sections_per_file == 0 {
            return Err(SyncError::ConfigError(
                "max_sections_per_file must be positive".to_string(),
            ));
        }
        if self.provider.batch_token_limit() == 0 {
            return Err(SyncError::ConfigError(
                "batch_token_limit must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.heading_similarity_threshold) {
            return Err(SyncError::ConfigError(format!(
                "heading_similarity_threshold must be within 0..=1, got {}",
                self.heading_similarity_threshold
            )));
        }
        Ok(())
    }

    /// Narrow the run to the repository pair the change request targets
    ///
    /// Languages and target root come from the matching `[[repositories]]`
    /// entry. With no entries configured the top-level values are kept.
    pub fn for_repository(mut self, source_repo: &str) -> SyncResult<Self> {
        if self.repositories.is_empty() {
            return Ok(self);
        }
        let repo = self
            .repositories
            .iter()
            .find(|r| r.source_repo.eq_ignore_ascii_case(source_repo))
            .cloned()
            .ok_or_else(|| {
                let known: Vec<&str> = self
                    .repositories
                    .iter()
                    .map(|r| r.source_repo.as_str())
                    .collect();
                SyncError::ConfigError(format!(
                    "Unsupported source repository: {}. Supported: {:?}",
                    source_repo, known
                ))
            })?;
        self.source_language = repo.source_language;
        self.target_language = repo.target_language;
        self.target_root = repo.target_root;
        Ok(self)
    }

    pub fn with_target_root(mut self, root: PathBuf) -> Self {
        self.target_root = root;
        self
    }

    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = dir;
        self
    }

    pub fn with_provider(mut self, kind: ProviderKind) -> Self {
        self.provider.kind = kind;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}
