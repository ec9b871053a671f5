//! Section-level synchronization of bilingual documentation trees
//!
//! When a change request lands in the source-language tree, the pipeline
//! carries the same edits into the target-language tree: changed documents
//! are split into heading sections, the changed sections are matched to
//! their counterparts in the target document, translated, and merged back
//! without touching any other section.
//!
//! # Example
//!
//! ```ignore
//! use banana_docsync::{PipelineOrchestrator, SyncConfig};
//! use banana_docsync::translate::build_generator;
//! use banana_docsync::vcs::{GitHubChangeSource, parse_pull_request_url};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = parse_pull_request_url("https://github.com/pingcap/docs/pull/1")?;
//!     let config = SyncConfig::default().for_repository(&request.repository())?;
//!     let source = Arc::new(GitHubChangeSource::from_env(request)?);
//!     let generator = build_generator(&config)?;
//!
//!     let summary = PipelineOrchestrator::new(config, source, generator).run().await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod budget;
pub mod change;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod media;
pub mod merge;
pub mod pipeline;
pub mod section;
pub mod target;
pub mod translate;
pub mod vcs;

pub use artifact::{ArtifactStore, Stage};
pub use budget::{BudgetDecision, HeuristicEstimator, TokenBudgetGate, TokenEstimator};
pub use change::{
    ChangeClassifier, ChangeRequest, ChangeSet, ClassifiedChanges, ClassifiedSection, FileChange,
    FileSectionsPayload, Operation,
};
pub use config::{ProviderConfig, ProviderKind, RepositoryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use matcher::{MatchMethod, MatchOutcome, MatchRecord, SectionMatcher, TargetLocation};
pub use merge::{TranslationMergeEngine, TranslationReport, merge_document};
pub use pipeline::{Bucket, FileOutcome, PipelineOrchestrator, RunSummary, Tally};
pub use section::{MarkdownSectionParser, SectionNode, SectionParser, SectionTree};
pub use target::TargetTree;
pub use translate::{PromptTurn, TextGenerator};
pub use vcs::ChangeSource;
