//! Toxicity filter — pattern heuristics with an optional scoring-model
//! seam.
//!
//! The pattern mode counts matches against a small built-in list.  When
//! a [`ToxicityScorer`] backend is attached, its score is compared to
//! the configured threshold instead; a backend failure falls back to
//! pattern matching.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::pipeline::checkpoint::{CheckContext, CheckpointError, Position};
use crate::verdict::Verdict;

use super::filter::{ContentFilter, Detection, FilterProfile};

const TOXIC_PATTERNS: &[&str] = &[
    r"\b(hate|kill|murder|attack)\s+(all|every|those)\s+\w+",
    r"\b(stupid|idiot|moron|dumb)\s+(people|person|users?)\b",
    r"\b(die|death)\s+(to|for)\s+\w+",
];

// ── ToxicityScorer ─────────────────────────────────────────────────────

/// Seam for an external toxicity-scoring model.
///
/// Implementations typically call a remote classification endpoint;
/// transient failures should be surfaced as
/// [`CheckpointError::BackendUnavailable`] so the filter can fall back
/// to its pattern mode.
#[async_trait]
pub trait ToxicityScorer: Send + Sync {
    /// Score the content's toxicity in `[0.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] when the backend cannot produce a
    /// score.
    async fn score(&self, content: &str) -> Result<f64, CheckpointError>;
}

// ── ToxicityConfig ─────────────────────────────────────────────────────

/// Configuration for [`ToxicityFilter`].
#[derive(Clone)]
pub struct ToxicityConfig {
    /// Score at or above which scored content is flagged.
    pub threshold: f64,
    /// Optional scoring backend; pattern mode when absent.
    pub scorer: Option<Arc<dyn ToxicityScorer>>,
    /// Verdict applied on a match (defaults to block).
    pub on_match: Verdict,
    /// Which phase(s) the filter runs in (defaults to output).
    pub position: Position,
}

impl Default for ToxicityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            scorer: None,
            on_match: Verdict::Block,
            position: Position::Output,
        }
    }
}

impl std::fmt::Debug for ToxicityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToxicityConfig")
            .field("threshold", &self.threshold)
            .field("has_scorer", &self.scorer.is_some())
            .field("on_match", &self.on_match)
            .field("position", &self.position)
            .finish()
    }
}

// ── ToxicityFilter ─────────────────────────────────────────────────────

/// Flags toxic content by pattern or model score.
#[derive(Clone)]
pub struct ToxicityFilter {
    profile: FilterProfile,
    threshold: f64,
    patterns: Vec<Regex>,
    scorer: Option<Arc<dyn ToxicityScorer>>,
}

impl std::fmt::Debug for ToxicityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToxicityFilter")
            .field("profile", &self.profile)
            .field("threshold", &self.threshold)
            .field("has_scorer", &self.scorer.is_some())
            .finish()
    }
}

impl ToxicityFilter {
    /// Build a filter from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::InvalidContent`] if a built-in pattern
    /// fails to compile.
    pub fn new(config: ToxicityConfig) -> Result<Self, CheckpointError> {
        let mut patterns = Vec::with_capacity(TOXIC_PATTERNS.len());
        for pattern in TOXIC_PATTERNS {
            patterns.push(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| CheckpointError::InvalidContent {
                        checkpoint: "toxicity_filter".into(),
                        reason: format!("pattern failed to compile: {e}"),
                    })?,
            );
        }

        Ok(Self {
            profile: FilterProfile::new("toxicity_filter", config.position, config.on_match),
            threshold: config.threshold,
            patterns,
            scorer: config.scorer,
        })
    }

    /// Build a pattern-mode filter with the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if a built-in pattern fails to
    /// compile.
    pub fn with_defaults() -> Result<Self, CheckpointError> {
        Self::new(ToxicityConfig::default())
    }

    fn pattern_detect(&self, content: &str) -> Detection {
        let match_count: usize = self
            .patterns
            .iter()
            .map(|p| p.find_iter(content).count())
            .sum();

        if match_count == 0 {
            return Detection::none();
        }

        Detection::matched(vec![format!(
            "toxic content detected: {match_count} matches"
        )])
        .with_metadata("pattern_matches", serde_json::json!(match_count))
    }
}

#[async_trait]
impl ContentFilter for ToxicityFilter {
    fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    async fn detect(
        &self,
        content: &str,
        _ctx: &CheckContext,
    ) -> Result<Detection, CheckpointError> {
        if let Some(scorer) = &self.scorer {
            match scorer.score(content).await {
                Ok(score) => {
                    if score >= self.threshold {
                        return Ok(Detection::matched(vec![format!(
                            "toxicity score {score:.2} exceeds threshold"
                        )])
                        .with_metadata("toxicity_score", serde_json::json!(score)));
                    }
                    return Ok(
                        Detection::none().with_metadata("toxicity_score", serde_json::json!(score))
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "toxicity scoring backend failed, using patterns");
                }
            }
        }

        Ok(self.pattern_detect(content))
    }
}

crate::impl_filter_checkpoint!(ToxicityFilter);

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CheckContext {
        CheckContext::default()
    }

    struct FixedScorer(f64);

    #[async_trait]
    impl ToxicityScorer for FixedScorer {
        async fn score(&self, _content: &str) -> Result<f64, CheckpointError> {
            Ok(self.0)
        }
    }

    struct BrokenScorer;

    #[async_trait]
    impl ToxicityScorer for BrokenScorer {
        async fn score(&self, _content: &str) -> Result<f64, CheckpointError> {
            Err(CheckpointError::BackendUnavailable {
                checkpoint: "toxicity_filter".into(),
                reason: "endpoint unreachable".into(),
            })
        }
    }

    #[tokio::test]
    async fn pattern_mode_counts_matches() {
        let filter = ToxicityFilter::with_defaults().unwrap();
        let detection = filter
            .detect("kill all humans and death to everyone", &ctx())
            .await
            .unwrap();
        assert!(detection.matched);
        assert_eq!(detection.metadata["pattern_matches"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn pattern_mode_passes_clean_content() {
        let filter = ToxicityFilter::with_defaults().unwrap();
        let detection = filter
            .detect("thanks, that was very helpful", &ctx())
            .await
            .unwrap();
        assert!(!detection.matched);
    }

    #[tokio::test]
    async fn scorer_above_threshold_flags() {
        let filter = ToxicityFilter::new(ToxicityConfig {
            scorer: Some(Arc::new(FixedScorer(0.9))),
            ..ToxicityConfig::default()
        })
        .unwrap();

        let detection = filter.detect("anything", &ctx()).await.unwrap();
        assert!(detection.matched);
        assert!(detection.reasons[0].contains("0.90"));
    }

    #[tokio::test]
    async fn scorer_below_threshold_passes_with_score_metadata() {
        let filter = ToxicityFilter::new(ToxicityConfig {
            scorer: Some(Arc::new(FixedScorer(0.1))),
            ..ToxicityConfig::default()
        })
        .unwrap();

        let detection = filter.detect("anything", &ctx()).await.unwrap();
        assert!(!detection.matched);
        assert_eq!(detection.metadata["toxicity_score"], serde_json::json!(0.1));
    }

    #[tokio::test]
    async fn broken_scorer_falls_back_to_patterns() {
        let filter = ToxicityFilter::new(ToxicityConfig {
            scorer: Some(Arc::new(BrokenScorer)),
            ..ToxicityConfig::default()
        })
        .unwrap();

        let detection = filter
            .detect("die for nothing, you idiot people", &ctx())
            .await
            .unwrap();
        assert!(detection.matched);
        assert!(detection.metadata.contains_key("pattern_matches"));
    }
}
