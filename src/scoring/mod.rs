//! The scoring core — pillar-score normalization, weighted aggregation,
//! and threshold-driven risk classification.
//!
//! - [`normalizer`] – raw metric values onto the unit interval
//! - [`aggregator`] – pillar scores into a composite with contributions
//! - [`thresholds`] – risk levels, violations, deployment verdicts
//! - [`weights`] – named pillar-weight presets and blends
//!
//! Construction-time configuration errors surface as
//! [`ScoringError`]; evaluation never fails — degenerate inputs
//! produce defaulted results with zero confidence.

pub mod aggregator;
pub mod normalizer;
pub mod thresholds;
pub mod weights;

pub use aggregator::{
    AggregatedScore, AggregationStrategy, ConfidencePolicy, PillarScore, ScoreAggregator,
    TrendAnalysis,
};
pub use normalizer::{
    NormalizationConfig, NormalizationMethod, NormalizationResult, ScoreNormalizer,
};
pub use thresholds::{
    DeploymentDecision, DeploymentRecommendation, RiskLevel, ThresholdCheckResult,
    ThresholdConfig, ThresholdManager, ThresholdPolicy, Violation,
};
pub use weights::{PillarWeights, WeightManager, WeightPreset};

use thiserror::Error;

/// Errors raised by scoring-core construction and configuration.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Threshold cut-points are not monotone for their orientation.
    #[error(
        "threshold '{name}' violates monotone ordering: \
         critical={critical}, high={high}, medium={medium}, low={low} \
         (higher_is_better={higher_is_better})"
    )]
    InvalidThresholds {
        /// Threshold name.
        name: String,
        /// Critical cut-point.
        critical: f64,
        /// High cut-point.
        high: f64,
        /// Medium cut-point.
        medium: f64,
        /// Low cut-point.
        low: f64,
        /// Orientation flag.
        higher_is_better: bool,
    },

    /// A pillar's confidence fell below the threshold under the `Fail`
    /// policy.
    #[error(
        "pillar '{pillar}' has confidence {confidence} below threshold {threshold}"
    )]
    LowConfidence {
        /// Offending pillar.
        pillar: String,
        /// Observed confidence.
        confidence: f64,
        /// Configured minimum.
        threshold: f64,
    },

    /// A fit was requested over an empty sample set.
    #[error("cannot fit normalizer '{metric}' to an empty sample set")]
    EmptySamples {
        /// Metric being fitted.
        metric: String,
    },

    /// A weight blend referenced no presets.
    #[error("weight blend requires at least one preset")]
    EmptyBlend,
}
