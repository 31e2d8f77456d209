//! Filter composition.
//!
//! [`FilterChain`] runs a set of checkpoints in two modes:
//!
//! - *sequential* — stop-on-block, with modifications flowing forward to
//!   later filters;
//! - *parallel* — every filter sees the same content and all verdicts
//!   are gathered; modifications are reported side by side but never
//!   composed.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::pipeline::checkpoint::{CheckContext, Checkpoint, GuardrailReport};
use crate::verdict::Verdict;

// ── ChainSummary ───────────────────────────────────────────────────────

/// Aggregate view over a set of chain results.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainSummary {
    /// Filters configured on the chain.
    pub total_filters: usize,
    /// Filters that actually ran.
    pub filters_run: usize,
    /// Results with a block verdict.
    pub blocked: usize,
    /// Results with a modify verdict.
    pub modified: usize,
    /// Results with a warn verdict.
    pub warnings: usize,
    /// True when nothing blocked.
    pub passed: bool,
    /// Reasons from every blocking result.
    pub block_reasons: Vec<Vec<String>>,
}

// ── FilterChain ────────────────────────────────────────────────────────

/// An ordered set of filters runnable sequentially or fanned out.
#[derive(Default, Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Checkpoint>>,
    stop_on_block: bool,
}

impl FilterChain {
    /// Create an empty chain that stops on the first block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            stop_on_block: true,
        }
    }

    /// Add a filter to the end of the chain.
    #[must_use]
    pub fn add_filter(mut self, filter: impl Checkpoint + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Add a pre-wrapped filter.
    #[must_use]
    pub fn add_shared_filter(mut self, filter: Arc<dyn Checkpoint>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Whether a sequential run stops at the first block (default
    /// `true`).
    #[must_use]
    pub fn stop_on_block(mut self, stop: bool) -> Self {
        self.stop_on_block = stop;
        self
    }

    /// Number of configured filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// True when no filters are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the chain sequentially; modifications flow forward.
    pub async fn run(&self, content: &str, ctx: &CheckContext) -> Vec<GuardrailReport> {
        let mut results = Vec::new();
        let mut current_content = content.to_string();

        for filter in &self.filters {
            if !filter.enabled() {
                continue;
            }

            let outcome =
                tokio::time::timeout(filter.timeout(), filter.check(&current_content, ctx)).await;

            match outcome {
                Ok(Ok(report)) => {
                    let blocked = report.action == Verdict::Block;
                    if let Some(modified) = &report.modified_content {
                        current_content = modified.clone();
                    }
                    results.push(report);
                    if blocked && self.stop_on_block {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(filter = filter.name(), error = %e, "filter failed");
                    if !filter.fail_open() {
                        results.push(GuardrailReport::block(
                            filter.name(),
                            &current_content,
                            vec![format!("filter error: {e}")],
                        ));
                        if self.stop_on_block {
                            break;
                        }
                    }
                }
                Err(_elapsed) => {
                    tracing::error!(filter = filter.name(), "filter timed out");
                    if !filter.fail_open() {
                        results.push(GuardrailReport::block(
                            filter.name(),
                            &current_content,
                            vec!["filter timed out".to_string()],
                        ));
                        if self.stop_on_block {
                            break;
                        }
                    }
                }
            }
        }

        results
    }

    /// Fan the chain out; every filter sees the original content.
    ///
    /// Modifications from parallel filters are not composable — each
    /// report carries its own view, side by side.
    pub async fn run_parallel(&self, content: &str, ctx: &CheckContext) -> Vec<GuardrailReport> {
        let enabled: Vec<&Arc<dyn Checkpoint>> =
            self.filters.iter().filter(|f| f.enabled()).collect();

        let checks = enabled.iter().map(|filter| async move {
            let outcome =
                tokio::time::timeout(filter.timeout(), filter.check(content, ctx)).await;
            (filter, outcome)
        });

        let mut results = Vec::new();
        for (filter, outcome) in join_all(checks).await {
            match outcome {
                Ok(Ok(report)) => results.push(report),
                Ok(Err(e)) => {
                    tracing::error!(filter = filter.name(), error = %e, "filter failed");
                    if !filter.fail_open() {
                        results.push(GuardrailReport::block(
                            filter.name(),
                            content,
                            vec![format!("filter error: {e}")],
                        ));
                    }
                }
                Err(_elapsed) => {
                    tracing::error!(filter = filter.name(), "filter timed out");
                    if !filter.fail_open() {
                        results.push(GuardrailReport::block(
                            filter.name(),
                            content,
                            vec!["filter timed out".to_string()],
                        ));
                    }
                }
            }
        }

        results
    }

    /// Summarize a set of chain results.
    #[must_use]
    pub fn summary(&self, results: &[GuardrailReport]) -> ChainSummary {
        let blocked: Vec<&GuardrailReport> = results
            .iter()
            .filter(|r| r.action == Verdict::Block)
            .collect();
        let modified = results
            .iter()
            .filter(|r| r.action == Verdict::Modify)
            .count();
        let warnings = results
            .iter()
            .filter(|r| r.action == Verdict::Warn)
            .count();

        ChainSummary {
            total_filters: self.filters.len(),
            filters_run: results.len(),
            blocked: blocked.len(),
            modified,
            warnings,
            passed: blocked.is_empty(),
            block_reasons: blocked.iter().map(|r| r.reasons.clone()).collect(),
        }
    }
}

/// The default chain from the original deployment: jailbreak on input,
/// PII redaction and topic restriction on both phases, toxicity on
/// output.
///
/// # Errors
///
/// Returns [`crate::pipeline::CheckpointError`] if a built-in pattern
/// fails to compile.
pub fn default_filter_chain() -> Result<FilterChain, crate::pipeline::CheckpointError> {
    use super::pii::{PiiConfig, PiiFilter};
    use super::toxicity::ToxicityFilter;
    use super::{jailbreak::JailbreakFilter, topic::TopicFilter};

    Ok(FilterChain::new()
        .add_filter(JailbreakFilter::with_defaults()?)
        .add_filter(PiiFilter::new(PiiConfig::new().on_match(Verdict::Modify))?)
        .add_filter(TopicFilter::with_defaults()?)
        .add_filter(ToxicityFilter::with_defaults()?))
}

// ── Tests ──────────────────────────────────────────────────────────────
