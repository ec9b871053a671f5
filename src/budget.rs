//! Token budget gate
//!
//! Estimates how expensive a file's translation will be from the new source
//! content of its classified sections and decides whether the file may go
//! on to the matching and translation stages.
//!
//! The gate fails open: if the estimator errors, the file is allowed.

use crate::change::ClassifiedSection;
use crate::error::SyncResult;
use tracing::{info, warn};

/// Estimates the processing cost of a text in tokens
///
/// Estimates must be monotonic in input length: a prefix never costs more
/// than the text it is a prefix of.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> SyncResult<u64>;
}

/// Character-class heuristic
///
/// About four ASCII bytes per token; every non-ASCII character (CJK text in
/// particular) counts as a token of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> SyncResult<u64> {
        let mut ascii_bytes: u64 = 0;
        let mut wide_chars: u64 = 0;
        for c in text.chars() {
            if c.is_ascii() {
                ascii_bytes += 1;
            } else {
                wide_chars += 1;
            }
        }
        Ok(ascii_bytes.div_ceil(4) + wide_chars)
    }
}

/// Outcome of a budget check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub cost: u64,
    pub ceiling: u64,
}

pub struct TokenBudgetGate {
    ceiling: u64,
    estimator: Box<dyn TokenEstimator>,
}

impl TokenBudgetGate {
    pub fn new(ceiling: u64) -> Self {
        Self::with_estimator(ceiling, Box::new(HeuristicEstimator))
    }

    pub fn with_estimator(ceiling: u64, estimator: Box<dyn TokenEstimator>) -> Self {
        Self { ceiling, estimator }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Estimate cost with the gate's estimator, without deciding anything
    pub fn estimate(&self, text: &str) -> SyncResult<u64> {
        self.estimator.estimate(text)
    }

    /// Check the aggregate new content of a file's classified sections
    pub fn check_sections(&self, sections: &[ClassifiedSection]) -> BudgetDecision {
        let mut aggregate = String::new();
        for section in sections {
            if !section.source_content.is_empty() {
                aggregate.push_str(&section.source_content);
                aggregate.push('\n');
            }
        }
        self.check_text(&aggregate)
    }

    pub fn check_text(&self, text: &str) -> BudgetDecision {
        if text.trim().is_empty() {
            return BudgetDecision {
                allowed: true,
                cost: 0,
                ceiling: self.ceiling,
            };
        }

        match self.estimator.estimate(text) {
            Ok(cost) => {
                let allowed = cost <= self.ceiling;
                if allowed {
                    info!("✅ Within token limit ({} ≤ {})", cost, self.ceiling);
                } else {
                    info!("❌ Token limit exceeded ({} > {})", cost, self.ceiling);
                }
                BudgetDecision {
                    allowed,
                    cost,
                    ceiling: self.ceiling,
                }
            }
            Err(e) => {
                warn!("Token estimation failed, allowing file: {}", e);
                BudgetDecision {
                    allowed: true,
                    cost: 0,
                    ceiling: self.ceiling,
                }
            }
        }
    }
}
