//! Pipeline orchestration
//!
//! One run synchronizes one change set. Buckets are processed in a fixed
//! order: deleted documents, added documents, special files, modified
//! documents, then media. Each modified document goes through
//!
//! 1. classify (persisted)
//! 2. budget gate
//! 3. match against the target document (persisted)
//! 4. translate (persisted again with the translations)
//! 5. merge and write
//!
//! and the write is always the last step, so a file that fails or is
//! skipped at any earlier stage is left untouched in the target tree.
//! Modified documents run concurrently, bounded by `max_parallel_files`.
//! A failing file is logged and counted; it never stops the run.

use crate::artifact::{ArtifactStore, Stage};
use crate::budget::TokenBudgetGate;
use crate::change::{
    ChangeClassifier, ChangeSet, ClassifiedSection, FileChange, FileSectionsPayload, Operation,
};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::matcher::{MatchRecord, SectionMatcher};
use crate::media::MediaSynchronizer;
use crate::merge::{TranslationMergeEngine, merge_document};
use crate::section::{MarkdownSectionParser, SectionParser};
use crate::target::TargetTree;
use crate::translate::TextGenerator;
use crate::vcs::ChangeSource;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Reporting bucket of the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    DeletedFiles,
    AddedFiles,
    SpecialFiles,
    ModifiedFiles,
    DeletedMedia,
    AddedMedia,
    ModifiedMedia,
}

impl Bucket {
    pub const ALL: [Bucket; 7] = [
        Bucket::DeletedFiles,
        Bucket::AddedFiles,
        Bucket::SpecialFiles,
        Bucket::ModifiedFiles,
        Bucket::DeletedMedia,
        Bucket::AddedMedia,
        Bucket::ModifiedMedia,
    ];
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bucket::DeletedFiles => "deleted files",
            Bucket::AddedFiles => "added files",
            Bucket::SpecialFiles => "special files",
            Bucket::ModifiedFiles => "modified files",
            Bucket::DeletedMedia => "deleted media",
            Bucket::AddedMedia => "added media",
            Bucket::ModifiedMedia => "modified media",
        };
        f.write_str(name)
    }
}

/// What happened to one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// The target tree now reflects the change
    Processed,
    /// Deliberately left alone (no section changes, over budget, deferred)
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Per-bucket counts of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    tallies: BTreeMap<Bucket, Tally>,
}

impl RunSummary {
    pub fn record(&mut self, bucket: Bucket, outcome: FileOutcome) {
        let tally = self.tallies.entry(bucket).or_default();
        match outcome {
            FileOutcome::Processed => tally.processed += 1,
            FileOutcome::Skipped => tally.skipped += 1,
            FileOutcome::Failed => tally.failed += 1,
        }
    }

    pub fn get(&self, bucket: Bucket) -> Tally {
        self.tallies.get(&bucket).copied().unwrap_or_default()
    }

    pub fn total_failed(&self) -> usize {
        self.tallies.values().map(|t| t.failed).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Summary")?;
        for bucket in Bucket::ALL {
            let tally = self.get(bucket);
            writeln!(
                f,
                "   {:<16} {} processed, {} skipped, {} failed",
                format!("{}:", bucket),
                tally.processed,
                tally.skipped,
                tally.failed
            )?;
        }
        Ok(())
    }
}

/// Drives the stages of every file in a change set
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: Arc<SyncConfig>,
    source: Arc<dyn ChangeSource>,
    parser: Arc<dyn SectionParser>,
    engine: Arc<TranslationMergeEngine>,
    gate: Arc<TokenBudgetGate>,
    classifier: ChangeClassifier,
    matcher: SectionMatcher,
    artifacts: ArtifactStore,
    target: TargetTree,
}

impl PipelineOrchestrator {
    pub fn new(config: SyncConfig, source: Arc<dyn ChangeSource>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            parser: Arc::new(MarkdownSectionParser::new()),
            engine: Arc::new(TranslationMergeEngine::new(&config, generator)),
            gate: Arc::new(TokenBudgetGate::new(config.source_token_limit)),
            classifier: ChangeClassifier::new(&config),
            matcher: SectionMatcher::new(&config),
            artifacts: ArtifactStore::new(config.staging_dir.clone()),
            target: TargetTree::new(config.target_root.clone()),
            source,
            config: Arc::new(config),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn SectionParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Synchronize the whole change set
    ///
    /// Only failures before any file is touched (staging setup, fetching the
    /// change set) are returned as errors.
    pub async fn run(&self) -> SyncResult<RunSummary> {
        if self.config.resume {
            info!("♻️  Resuming with artifacts in {}", self.artifacts.root().display());
        } else {
            self.artifacts.clear().await?;
        }

        let change_set = Arc::new(self.source.change_set().await?);
        let buckets = self.classifier.partition(&change_set);
        info!(
            "📋 {} from {}: {} added, {} modified, {} deleted, {} special, {} media",
            change_set.files.len(),
            self.source.source_name(),
            buckets.added_files.len(),
            buckets.modified_files.len(),
            buckets.deleted_files.len(),
            buckets.special_files.len(),
            buckets.added_media.len() + buckets.changed_media.len()
        );

        let mut summary = RunSummary::default();

        for change in &buckets.deleted_files {
            let outcome = self.report(&change.path, self.process_deleted(change).await);
            summary.record(Bucket::DeletedFiles, outcome);
        }

        for change in &buckets.added_files {
            let outcome = self.report(&change.path, self.process_added(change, &change_set).await);
            summary.record(Bucket::AddedFiles, outcome);
        }

        for change in &buckets.special_files {
            info!("📑 {} deferred: index files are maintained separately", change.path);
            summary.record(Bucket::SpecialFiles, FileOutcome::Skipped);
        }

        for outcome in self.process_modified_all(&buckets.modified_files, &change_set).await {
            summary.record(Bucket::ModifiedFiles, outcome);
        }

        let media = MediaSynchronizer::new(self.source.as_ref(), &self.target)
            .sync(&change_set, &buckets.added_media, &buckets.changed_media)
            .await;
        for change in buckets.added_media.iter().chain(&buckets.changed_media) {
            let bucket = match change.operation {
                Operation::Added => Bucket::AddedMedia,
                Operation::Modified => Bucket::ModifiedMedia,
                Operation::Deleted => Bucket::DeletedMedia,
            };
            let outcome = if media.failed.contains(&change.path) {
                FileOutcome::Failed
            } else if media.copied.contains(&change.path) || media.removed.contains(&change.path) {
                FileOutcome::Processed
            } else {
                FileOutcome::Skipped
            };
            summary.record(bucket, outcome);
        }

        info!("✅ Run finished with {} failed files", summary.total_failed());
        Ok(summary)
    }

    fn report(&self, path: &str, result: SyncResult<FileOutcome>) -> FileOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_transient() {
                    error!("❌ {} failed (collaborator): {}", path, e);
                } else {
                    error!("❌ {} failed: {}", path, e);
                }
                FileOutcome::Failed
            }
        }
    }

    async fn process_deleted(&self, change: &FileChange) -> SyncResult<FileOutcome> {
        if self.target.remove(&change.path).await? {
            info!("🗑️  Removed {}", change.path);
            Ok(FileOutcome::Processed)
        } else {
            info!("{} has no target counterpart, nothing to remove", change.path);
            Ok(FileOutcome::Skipped)
        }
    }

    async fn process_added(&self, change: &FileChange, change_set: &ChangeSet) -> SyncResult<FileOutcome> {
        let text = self
            .source
            .file_text(&change.path, &change_set.head_revision)
            .await?;
        let tree = self.parser.parse(&text)?;
        info!("🆕 Translating new document {} ({} sections)", change.path, tree.len());
        let translated = self.engine.translate_document(&text, &tree).await?;
        self.target.write(&change.path, translated).await?;
        info!("✅ Wrote {}", change.path);
        Ok(FileOutcome::Processed)
    }

    async fn process_modified_all(&self, changes: &[FileChange], change_set: &Arc<ChangeSet>) -> Vec<FileOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_files.max(1)));
        let mut tasks = JoinSet::new();
        for change in changes.iter().cloned() {
            let this = self.clone();
            let change_set = Arc::clone(change_set);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return FileOutcome::Failed;
                };
                let result = this.process_modified(&change, &change_set).await;
                this.report(&change.path, result)
            });
        }

        let mut outcomes = Vec::with_capacity(changes.len());
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.unwrap_or_else(|e| {
                error!("❌ File task aborted: {}", e);
                FileOutcome::Failed
            }));
        }
        outcomes
    }

    async fn classified_sections(&self, change: &FileChange, change_set: &ChangeSet) -> SyncResult<Option<Vec<ClassifiedSection>>> {
        let path = &change.path;
        if let Some(payload) = self
            .artifacts
            .load::<FileSectionsPayload>(path, Stage::ClassifiedSections)
            .await?
        {
            debug!("Reusing classified sections of {}", path);
            return Ok(Some(payload.into_sections()));
        }

        let payload = self
            .classifier
            .classify_modified(change, change_set, self.source.as_ref(), self.parser.as_ref())
            .await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        self.artifacts
            .save(path, Stage::ClassifiedSections, &payload)
            .await?;
        Ok(Some(payload.into_sections()))
    }

    async fn process_modified(&self, change: &FileChange, change_set: &ChangeSet) -> SyncResult<FileOutcome> {
        let path = &change.path;

        let Some(sections) = self.classified_sections(change, change_set).await? else {
            info!("{} has no section-level changes", path);
            return Ok(FileOutcome::Skipped);
        };
        info!("🔍 {}: {} changed sections", path, sections.len());

        let decision = self.gate.check_sections(&sections);
        if !decision.allowed {
            warn!(
                "⏭️  Skipping {}: estimated {} tokens exceeds the limit of {}",
                path, decision.cost, decision.ceiling
            );
            return Ok(FileOutcome::Skipped);
        }

        let Some(target_text) = self.target.read(path).await? else {
            warn!("⏭️  Skipping {}: no target document", path);
            return Ok(FileOutcome::Skipped);
        };
        if let Some(written) = self.artifacts.load::<String>(path, Stage::Written).await? {
            if written == target_text {
                info!("{} already written in an earlier run", path);
                return Ok(FileOutcome::Processed);
            }
            debug!("{} changed since the earlier write, merging again", path);
        }
        let target_tree = self.parser.parse(&target_text)?;

        let mut records = match self
            .artifacts
            .load::<Vec<MatchRecord>>(path, Stage::MatchRecords)
            .await?
        {
            Some(records) => {
                debug!("Reusing match records of {}", path);
                records
            }
            None => {
                let outcome = self.matcher.match_sections(&sections, &target_tree, &target_text);
                let unmatched = outcome.unmatched();
                if !unmatched.is_empty() {
                    info!("{}: no target for {}", path, unmatched.join(", "));
                }
                self.artifacts
                    .save(path, Stage::MatchRecords, &outcome.records)
                    .await?;
                outcome.records
            }
        };

        if !records.iter().any(|r| r.is_matched()) {
            warn!("⏭️  Skipping {}: no section matched the target document", path);
            return Ok(FileOutcome::Skipped);
        }

        let report = self.engine.translate(&mut records).await;
        if report.batches > 0 {
            self.artifacts
                .save(path, Stage::MatchRecords, &records)
                .await?;
        }
        let missing: Vec<&str> = records
            .iter()
            .filter(|r| r.needs_translation() && r.target_new_content.is_none())
            .map(|r| r.section_key.as_str())
            .collect();
        if !missing.is_empty() {
            if !self.config.allow_partial_merge {
                warn!("❌ {}: untranslated sections {}, not merging", path, missing.join(", "));
                return Ok(FileOutcome::Failed);
            }
            warn!("{}: merging without {}", path, missing.join(", "));
        }

        let merged = merge_document(&target_text, &target_tree, &records);
        if merged == target_text {
            info!("{} already up to date", path);
        } else {
            self.target.write(path, &merged).await?;
            info!("✅ Updated {}", path);
        }
        self.artifacts.save(path, Stage::Written, &merged).await?;
        Ok(FileOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::patch;
    use crate::config::ProviderKind;
    use crate::translate::{MockGenerator, MockMode};
    use crate::vcs::InMemoryChangeSource;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    const BEFORE: &str = "# Intro\n\nhello\n\n# Setup\n\nold\n\n# FAQ\n\nq\n";
    const AFTER: &str = "# Intro\n\nhello\n\n# Setup\n\nnew\n";
    const TARGET: &str = "# 简介\n\n你好\n\n# 设置\n\n旧\n\n# 常见问题\n\n问\n";

    struct Fixture {
        dir: TempDir,
        config: SyncConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = SyncConfig::default()
                .with_target_root(dir.path().join("target"))
                .with_staging_dir(dir.path().join("staging"))
                .with_provider(ProviderKind::Mock);
            Self { dir, config }
        }

        fn target(&self, path: &str) -> std::path::PathBuf {
            self.dir.path().join("target").join(path)
        }

        fn write_target(&self, path: &str, text: &str) {
            let full = self.target(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, text).unwrap();
        }

        fn read_target(&self, path: &str) -> String {
            std::fs::read_to_string(self.target(path)).unwrap()
        }

        fn orchestrator(&self, source: InMemoryChangeSource, mock: Arc<MockGenerator>) -> PipelineOrchestrator {
            PipelineOrchestrator::new(self.config.clone(), Arc::new(source), mock)
        }
    }

    fn setup_mapping() -> MockMode {
        let mut map = HashMap::new();
        map.insert("# Setup\n\nnew\n".to_string(), "# 设置\n\n新\n".to_string());
        MockMode::Mappings(map)
    }

    /// A change set modifying docs/guide.md from BEFORE to AFTER, patch omitted
    fn modified_source() -> InMemoryChangeSource {
        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![FileChange::new("docs/guide.md", Operation::Modified, "")],
        );
        InMemoryChangeSource::new(change_set)
            .with_file("base", "docs/guide.md", BEFORE)
            .with_file("head", "docs/guide.md", AFTER)
    }

    // ========== Scenario Tests ==========

    #[tokio::test]
    async fn test_modified_file_scenario() {
        let fixture = Fixture::new();
        fixture.write_target("docs/guide.md", TARGET);
        let mock = Arc::new(MockGenerator::new(setup_mapping()));

        let summary = fixture.orchestrator(modified_source(), mock.clone()).run().await.unwrap();

        assert_eq!(fixture.read_target("docs/guide.md"), "# 简介\n\n你好\n\n# 设置\n\n新\n");
        assert_eq!(summary.get(Bucket::ModifiedFiles).processed, 1);
        assert_eq!(mock.calls(), 1);

        let staging = fixture.dir.path().join("staging");
        assert!(staging.join("docs-guide-source-diff-dict.json").exists());
        assert!(staging.join("docs-guide-match-source-diff-to-target.json").exists());
    }

    #[tokio::test]
    async fn test_patch_rebuilds_before_text() {
        let fixture = Fixture::new();
        fixture.write_target("docs/guide.md", TARGET);
        let patch_text = "@@ -5,7 +5,3 @@\n # Setup\n \n-old\n-\n-# FAQ\n-\n-q\n+new\n";
        assert_eq!(patch::reverse_apply(AFTER, patch_text).unwrap(), BEFORE);

        // No base revision available: the patch is the only way back
        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![FileChange::new("docs/guide.md", Operation::Modified, patch_text)],
        );
        let source = InMemoryChangeSource::new(change_set).with_file("head", "docs/guide.md", AFTER);
        let mock = Arc::new(MockGenerator::new(setup_mapping()));

        fixture.orchestrator(source, mock).run().await.unwrap();
        assert_eq!(fixture.read_target("docs/guide.md"), "# 简介\n\n你好\n\n# 设置\n\n新\n");
    }

    #[tokio::test]
    async fn test_idempotent_runs() {
        let first = Fixture::new();
        let second = Fixture::new();
        for fixture in [&first, &second] {
            fixture.write_target("docs/guide.md", TARGET);
            let mock = Arc::new(MockGenerator::new(MockMode::Suffix));
            fixture.orchestrator(modified_source(), mock).run().await.unwrap();
        }
        assert_eq!(first.read_target("docs/guide.md"), second.read_target("docs/guide.md"));
    }

    #[tokio::test]
    async fn test_gate_denial_leaves_target_untouched() {
        let mut fixture = Fixture::new();
        fixture.config.source_token_limit = 1;
        fixture.write_target("docs/guide.md", TARGET);
        let mock = Arc::new(MockGenerator::new(MockMode::Suffix));

        let summary = fixture.orchestrator(modified_source(), mock.clone()).run().await.unwrap();

        assert_eq!(fixture.read_target("docs/guide.md"), TARGET);
        assert_eq!(summary.get(Bucket::ModifiedFiles).skipped, 1);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_translation_is_not_merged() {
        let fixture = Fixture::new();
        fixture.write_target("docs/guide.md", TARGET);
        let mock = Arc::new(MockGenerator::new(MockMode::Error("service down".to_string())));

        let summary = fixture.orchestrator(modified_source(), mock).run().await.unwrap();

        assert_eq!(fixture.read_target("docs/guide.md"), TARGET);
        assert_eq!(summary.get(Bucket::ModifiedFiles).failed, 1);
    }

    #[tokio::test]
    async fn test_partial_merge_when_allowed() {
        let mut fixture = Fixture::new();
        fixture.config.allow_partial_merge = true;
        fixture.write_target("docs/guide.md", TARGET);
        let mock = Arc::new(MockGenerator::new(MockMode::Omit));

        fixture.orchestrator(modified_source(), mock).run().await.unwrap();
        // The deletion still applies; the untranslated section keeps its old text
        assert_eq!(fixture.read_target("docs/guide.md"), "# 简介\n\n你好\n\n# 设置\n\n旧\n");
    }

    #[tokio::test]
    async fn test_whitespace_only_change_is_skipped() {
        let fixture = Fixture::new();
        fixture.write_target("docs/guide.md", TARGET);
        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![FileChange::new("docs/guide.md", Operation::Modified, "")],
        );
        let source = InMemoryChangeSource::new(change_set)
            .with_file("base", "docs/guide.md", BEFORE)
            .with_file("head", "docs/guide.md", &BEFORE.replace("hello", "hello   "));
        let mock = Arc::new(MockGenerator::new(MockMode::Suffix));

        let summary = fixture.orchestrator(source, mock.clone()).run().await.unwrap();
        assert_eq!(summary.get(Bucket::ModifiedFiles).skipped, 1);
        assert_eq!(mock.calls(), 0);
        assert_eq!(fixture.read_target("docs/guide.md"), TARGET);
    }

    #[tokio::test]
    async fn test_no_matching_section_is_skipped() {
        let fixture = Fixture::new();
        // Only a level-two section: neither changed level-one section has a counterpart
        let target = "## 甲\n\n旧\n";
        fixture.write_target("docs/guide.md", target);
        let mock = Arc::new(MockGenerator::new(MockMode::Suffix));

        let summary = fixture.orchestrator(modified_source(), mock.clone()).run().await.unwrap();

        let tally = summary.get(Bucket::ModifiedFiles);
        assert_eq!(tally.skipped, 1);
        assert_eq!(tally.processed, 0);
        assert_eq!(mock.calls(), 0);
        assert_eq!(fixture.read_target("docs/guide.md"), target);
    }

    #[tokio::test]
    async fn test_similar_paths_both_processed() {
        let mut fixture = Fixture::new();
        fixture.config.max_parallel_files = 1;
        fixture.write_target("a-b.md", TARGET);
        fixture.write_target("a/b.md", TARGET);

        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![
                FileChange::new("a-b.md", Operation::Modified, ""),
                FileChange::new("a/b.md", Operation::Modified, ""),
            ],
        );
        let source = InMemoryChangeSource::new(change_set)
            .with_file("base", "a-b.md", BEFORE)
            .with_file("head", "a-b.md", AFTER)
            .with_file("base", "a/b.md", BEFORE)
            .with_file("head", "a/b.md", AFTER);
        let mock = Arc::new(MockGenerator::new(setup_mapping()));

        let summary = fixture.orchestrator(source, mock).run().await.unwrap();

        let tally = summary.get(Bucket::ModifiedFiles);
        assert_eq!(tally.processed, 2);
        assert_eq!(tally.failed, 0);
        for path in ["a-b.md", "a/b.md"] {
            assert_eq!(fixture.read_target(path), "# 简介\n\n你好\n\n# 设置\n\n新\n");
        }
    }

    // ========== Resume Tests ==========

    #[tokio::test]
    async fn test_resume_reuses_translated_artifacts() {
        let mut fixture = Fixture::new();
        fixture.write_target("docs/guide.md", TARGET);
        let first = Arc::new(MockGenerator::new(setup_mapping()));
        fixture.orchestrator(modified_source(), first).run().await.unwrap();

        // Restore the target as if the write never happened, then resume
        fixture.write_target("docs/guide.md", TARGET);
        fixture.config.resume = true;
        let second = Arc::new(MockGenerator::new(MockMode::Error("must not be called".to_string())));
        let summary = fixture.orchestrator(modified_source(), second.clone()).run().await.unwrap();

        assert_eq!(second.calls(), 0);
        assert_eq!(summary.get(Bucket::ModifiedFiles).processed, 1);
        assert_eq!(fixture.read_target("docs/guide.md"), "# 简介\n\n你好\n\n# 设置\n\n新\n");
    }

    #[tokio::test]
    async fn test_resume_after_write_keeps_target() {
        let mut fixture = Fixture::new();
        fixture.write_target("docs/guide.md", "# 简介\n\n你好\n\n# 设置\n\n设\n");
        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![FileChange::new("docs/guide.md", Operation::Modified, "")],
        );
        let source = || {
            InMemoryChangeSource::new(change_set.clone())
                .with_file("base", "docs/guide.md", "# Intro\n\nhi\n\n# Setup\n\ns\n")
                .with_file("head", "docs/guide.md", "# Intro\n\nhi\n\n# Install\n\ni\n\n# Setup\n\ns\n")
        };

        let first = Arc::new(MockGenerator::new(MockMode::Suffix));
        fixture.orchestrator(source(), first).run().await.unwrap();
        let written = fixture.read_target("docs/guide.md");
        assert_eq!(written.matches("# Install").count(), 1);
        assert!(written.contains("i_Chinese"));

        // Resume against the already merged target
        fixture.config.resume = true;
        let second = Arc::new(MockGenerator::new(MockMode::Error("must not be called".to_string())));
        let summary = fixture.orchestrator(source(), second.clone()).run().await.unwrap();

        assert_eq!(second.calls(), 0);
        assert_eq!(summary.get(Bucket::ModifiedFiles).processed, 1);
        assert_eq!(fixture.read_target("docs/guide.md"), written);
    }

    #[tokio::test]
    async fn test_corrupt_artifact_skips_only_that_file() {
        let mut fixture = Fixture::new();
        fixture.config.resume = true;
        fixture.write_target("docs/guide.md", TARGET);
        fixture.write_target("docs/other.md", TARGET);

        let staging = fixture.dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("docs-guide-source-diff-dict.json"), "{ truncated").unwrap();

        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![
                FileChange::new("docs/guide.md", Operation::Modified, ""),
                FileChange::new("docs/other.md", Operation::Modified, ""),
            ],
        );
        let source = InMemoryChangeSource::new(change_set)
            .with_file("base", "docs/guide.md", BEFORE)
            .with_file("head", "docs/guide.md", AFTER)
            .with_file("base", "docs/other.md", BEFORE)
            .with_file("head", "docs/other.md", AFTER);
        let mock = Arc::new(MockGenerator::new(setup_mapping()));

        let summary = fixture.orchestrator(source, mock).run().await.unwrap();
        let tally = summary.get(Bucket::ModifiedFiles);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.processed, 1);
        assert_eq!(fixture.read_target("docs/guide.md"), TARGET);
        assert_eq!(fixture.read_target("docs/other.md"), "# 简介\n\n你好\n\n# 设置\n\n新\n");
    }

    // ========== Bucket Tests ==========

    #[tokio::test]
    async fn test_whole_file_buckets() {
        let fixture = Fixture::new();
        fixture.write_target("old.md", "# 旧\n");
        fixture.write_target("TOC.md", "- [简介](intro.md)\n");
        fixture.write_target("media/gone.png", "x");

        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![
                FileChange::new("new/page.md", Operation::Added, ""),
                FileChange::new("old.md", Operation::Deleted, ""),
                FileChange::new("TOC.md", Operation::Modified, ""),
                FileChange::new("TOC-tidb-cloud.md", Operation::Modified, ""),
                FileChange::new("media/new.png", Operation::Added, ""),
                FileChange::new("media/gone.png", Operation::Deleted, ""),
            ],
        );
        let source = InMemoryChangeSource::new(change_set)
            .with_file("head", "new/page.md", "# Page\n\nText.\n")
            .with_bytes("head", "media/new.png", vec![1, 2, 3]);
        let mock = Arc::new(MockGenerator::new(MockMode::Suffix));

        let summary = fixture.orchestrator(source, mock).run().await.unwrap();

        assert_eq!(fixture.read_target("new/page.md"), "# Page\n\nText._Chinese\n");
        assert!(!fixture.target("old.md").exists());
        assert_eq!(fixture.read_target("TOC.md"), "- [简介](intro.md)\n");
        assert!(!fixture.target("TOC-tidb-cloud.md").exists());
        assert_eq!(std::fs::read(fixture.target("media/new.png")).unwrap(), vec![1, 2, 3]);
        assert!(!fixture.target("media/gone.png").exists());

        assert_eq!(summary.get(Bucket::AddedFiles).processed, 1);
        assert_eq!(summary.get(Bucket::DeletedFiles).processed, 1);
        assert_eq!(summary.get(Bucket::SpecialFiles).skipped, 1);
        assert_eq!(summary.get(Bucket::AddedMedia).processed, 1);
        assert_eq!(summary.get(Bucket::DeletedMedia).processed, 1);
        assert_eq!(summary.total_failed(), 0);
    }

    #[tokio::test]
    async fn test_failed_new_document_is_not_written() {
        let fixture = Fixture::new();
        let change_set = ChangeSet::new(
            "base",
            "head",
            vec![FileChange::new("new.md", Operation::Added, "")],
        );
        let source = InMemoryChangeSource::new(change_set).with_file("head", "new.md", "# A\n\na\n");
        let mock = Arc::new(MockGenerator::new(MockMode::Omit));

        let summary = fixture.orchestrator(source, mock).run().await.unwrap();
        assert_eq!(summary.get(Bucket::AddedFiles).failed, 1);
        assert!(!Path::new(&fixture.target("new.md")).exists());
    }

    #[test]
    fn test_summary_display() {
        let mut summary = RunSummary::default();
        summary.record(Bucket::ModifiedFiles, FileOutcome::Processed);
        summary.record(Bucket::ModifiedFiles, FileOutcome::Skipped);
        let text = summary.to_string();
        assert!(text.contains("modified files:  1 processed, 1 skipped, 0 failed"));
        assert!(text.contains("added media:     0 processed"));
    }
}
