//! Score aggregation — pillar scores into a composite with per-pillar
//! contributions.
//!
//! Ten strategies over `(pillar, score, confidence, weight)` tuples.
//! Low-confidence inputs are pre-filtered per the configured
//! [`ConfidencePolicy`]; an empty surviving set yields a defaulted
//! result with zero confidence and an unknown risk level rather than an
//! error.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ScoringError;
use super::thresholds::RiskLevel;
use crate::pipeline::checkpoint::Metadata;

const GEO_EPSILON: f64 = 1e-10;

// ── AggregationStrategy ────────────────────────────────────────────────

/// Reduction strategy over a set of pillar scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// `Σ wᵢvᵢ / Σ wᵢ`; arithmetic mean when `Σw = 0`.
    WeightedAverage,
    /// `Σ vᵢ / n`.
    ArithmeticMean,
    /// `exp(Σ ln(max(vᵢ, ε)) / n)`.
    GeometricMean,
    /// `n / Σ (1 / max(vᵢ, ε))`.
    HarmonicMean,
    /// The smallest score.
    Minimum,
    /// The largest score.
    Maximum,
    /// The median score.
    Median,
    /// `∏ vᵢ^(wᵢ/Σw)` — the weighted geometric mean.
    WeightedProduct,
    /// The 10th percentile (worst-case posture).
    Percentile90,
    /// The 5th percentile (worst-case posture).
    Percentile95,
}

impl AggregationStrategy {
    /// Every strategy, for comparison sweeps.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::WeightedAverage,
            Self::ArithmeticMean,
            Self::GeometricMean,
            Self::HarmonicMean,
            Self::Minimum,
            Self::Maximum,
            Self::Median,
            Self::WeightedProduct,
            Self::Percentile90,
            Self::Percentile95,
        ]
    }
}

// ── PillarScore ────────────────────────────────────────────────────────

/// One pillar's evaluation score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarScore {
    /// Pillar name.
    pub pillar_name: String,
    /// Normalized score in `[0, 1]` (1.0 = best).
    pub score: f64,
    /// Confidence in the score (0.0–1.0).
    pub confidence: f64,
    /// Aggregation weight (positive).
    pub weight: f64,
    /// Raw metrics backing the score.
    #[serde(default)]
    pub raw_metrics: Metadata,
    /// When the score was produced (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PillarScore {
    /// Create a full-confidence, unit-weight score.
    #[must_use]
    pub fn new(pillar_name: impl Into<String>, score: f64) -> Self {
        Self {
            pillar_name: pillar_name.into(),
            score,
            confidence: 1.0,
            weight: 1.0,
            raw_metrics: Metadata::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the confidence.
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the weight.
    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

// ── AggregatedScore ────────────────────────────────────────────────────

/// The composite produced by one aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedScore {
    /// Overall score in `[0, 1]`.
    pub overall_score: f64,
    /// The strategy that produced it.
    pub strategy_used: AggregationStrategy,
    /// The surviving pillar scores.
    pub pillar_scores: BTreeMap<String, f64>,
    /// Each pillar's contribution to the overall score.
    pub pillar_contributions: BTreeMap<String, f64>,
    /// Weighted overall confidence.
    pub confidence: f64,
    /// Risk classification of the overall score.
    pub risk_level: RiskLevel,
    /// When the aggregate was produced (UTC).
    pub timestamp: DateTime<Utc>,
}

// ── ConfidencePolicy ───────────────────────────────────────────────────

/// What to do with a score whose confidence is below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
    /// Drop the score.
    Exclude,
    /// Replace the score with the configured default.
    Default,
    /// Fail the aggregation.
    Fail,
}

// ── ScoreAggregator ────────────────────────────────────────────────────

/// Aggregates pillar scores into composite safety scores.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    default_strategy: AggregationStrategy,
    min_confidence_threshold: f64,
    confidence_policy: ConfidencePolicy,
    default_score: f64,
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self {
            default_strategy: AggregationStrategy::WeightedAverage,
            min_confidence_threshold: 0.5,
            confidence_policy: ConfidencePolicy::Exclude,
            default_score: 0.5,
        }
    }
}

impl ScoreAggregator {
    /// Create an aggregator with the given default strategy.
    #[must_use]
    pub fn new(default_strategy: AggregationStrategy) -> Self {
        Self {
            default_strategy,
            ..Self::default()
        }
    }

    /// Set the minimum confidence threshold (default 0.5).
    #[must_use]
    pub fn min_confidence_threshold(mut self, threshold: f64) -> Self {
        self.min_confidence_threshold = threshold;
        self
    }

    /// Set the low-confidence policy (default exclude).
    #[must_use]
    pub fn confidence_policy(mut self, policy: ConfidencePolicy) -> Self {
        self.confidence_policy = policy;
        self
    }

    /// Set the default score used for replacement and empty sets.
    #[must_use]
    pub fn default_score(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    /// Aggregate pillar scores into a composite.
    ///
    /// `weights` overrides individual pillar weights by name.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::LowConfidence`] only under
    /// [`ConfidencePolicy::Fail`].
    pub fn aggregate(
        &self,
        pillar_scores: &[PillarScore],
        strategy: Option<AggregationStrategy>,
        weights: Option<&FxHashMap<String, f64>>,
    ) -> Result<AggregatedScore, ScoringError> {
        let strategy = strategy.unwrap_or(self.default_strategy);

        let mut valid = self.filter_scores(pillar_scores)?;

        if valid.is_empty() {
            return Ok(AggregatedScore {
                overall_score: self.default_score,
                strategy_used: strategy,
                pillar_scores: BTreeMap::new(),
                pillar_contributions: BTreeMap::new(),
                confidence: 0.0,
                risk_level: RiskLevel::Unknown,
                timestamp: Utc::now(),
            });
        }

        if let Some(overrides) = weights {
            for score in &mut valid {
                if let Some(w) = overrides.get(&score.pillar_name) {
                    score.weight = *w;
                }
            }
        }

        let overall_score = calculate_aggregate(&valid, strategy);
        let pillar_contributions = calculate_contributions(&valid, strategy);
        let confidence = calculate_confidence(&valid);

        Ok(AggregatedScore {
            overall_score,
            strategy_used: strategy,
            pillar_scores: valid
                .iter()
                .map(|s| (s.pillar_name.clone(), s.score))
                .collect(),
            pillar_contributions,
            confidence,
            risk_level: risk_level_for(overall_score),
            timestamp: Utc::now(),
        })
    }

    fn filter_scores(&self, scores: &[PillarScore]) -> Result<Vec<PillarScore>, ScoringError> {
        let mut valid = Vec::with_capacity(scores.len());
        for score in scores {
            if score.confidence >= self.min_confidence_threshold {
                valid.push(score.clone());
                continue;
            }
            match self.confidence_policy {
                ConfidencePolicy::Exclude => {}
                ConfidencePolicy::Default => {
                    let mut replaced = score.clone();
                    replaced.score = self.default_score;
                    valid.push(replaced);
                }
                ConfidencePolicy::Fail => {
                    return Err(ScoringError::LowConfidence {
                        pillar: score.pillar_name.clone(),
                        confidence: score.confidence,
                        threshold: self.min_confidence_threshold,
                    });
                }
            }
        }
        Ok(valid)
    }

    /// Aggregate pillar subsets per category.
    #[must_use]
    pub fn aggregate_by_category(
        &self,
        pillar_scores: &[PillarScore],
        category_mapping: &[(String, Vec<String>)],
        strategy: Option<AggregationStrategy>,
    ) -> BTreeMap<String, AggregatedScore> {
        let by_name: FxHashMap<&str, &PillarScore> = pillar_scores
            .iter()
            .map(|s| (s.pillar_name.as_str(), s))
            .collect();

        let mut results = BTreeMap::new();
        for (category, pillar_names) in category_mapping {
            let subset: Vec<PillarScore> = pillar_names
                .iter()
                .filter_map(|n| by_name.get(n.as_str()).map(|s| (*s).clone()))
                .collect();
            if subset.is_empty() {
                continue;
            }
            if let Ok(aggregate) = self.aggregate(&subset, strategy, None) {
                results.insert(category.clone(), aggregate);
            }
        }
        results
    }

    /// Run every strategy over the same inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::LowConfidence`] only under
    /// [`ConfidencePolicy::Fail`].
    pub fn compare_aggregations(
        &self,
        pillar_scores: &[PillarScore],
    ) -> Result<BTreeMap<&'static str, AggregatedScore>, ScoringError> {
        let mut results = BTreeMap::new();
        for strategy in AggregationStrategy::all() {
            let aggregate = self.aggregate(pillar_scores, Some(strategy), None)?;
            let name = match strategy {
                AggregationStrategy::WeightedAverage => "weighted_average",
                AggregationStrategy::ArithmeticMean => "arithmetic_mean",
                AggregationStrategy::GeometricMean => "geometric_mean",
                AggregationStrategy::HarmonicMean => "harmonic_mean",
                AggregationStrategy::Minimum => "minimum",
                AggregationStrategy::Maximum => "maximum",
                AggregationStrategy::Median => "median",
                AggregationStrategy::WeightedProduct => "weighted_product",
                AggregationStrategy::Percentile90 => "percentile_90",
                AggregationStrategy::Percentile95 => "percentile_95",
            };
            results.insert(name, aggregate);
        }
        Ok(results)
    }

    /// Analyze a time-ordered sequence of score sets.
    ///
    /// Direction uses a 0.05 dead-band; volatility is the standard
    /// deviation of the overall scores.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::LowConfidence`] only under
    /// [`ConfidencePolicy::Fail`]; fewer than two data points yield
    /// `None`.
    pub fn trend_analysis(
        &self,
        historical_scores: &[Vec<PillarScore>],
        strategy: Option<AggregationStrategy>,
    ) -> Result<Option<TrendAnalysis>, ScoringError> {
        if historical_scores.len() < 2 {
            return Ok(None);
        }

        let mut aggregates = Vec::with_capacity(historical_scores.len());
        for scores in historical_scores {
            aggregates.push(self.aggregate(scores, strategy, None)?);
        }

        let overall: Vec<f64> = aggregates.iter().map(|a| a.overall_score).collect();
        let first = overall[0];
        let latest = overall[overall.len() - 1];

        let mut pillar_trends = BTreeMap::new();
        let mut all_pillars: Vec<&String> = aggregates
            .iter()
            .flat_map(|a| a.pillar_scores.keys())
            .collect();
        all_pillars.sort();
        all_pillars.dedup();

        for pillar in all_pillars {
            let series: Vec<f64> = aggregates
                .iter()
                .filter_map(|a| a.pillar_scores.get(pillar).copied())
                .collect();
            if series.len() < 2 {
                continue;
            }
            let change = series[series.len() - 1] - series[0];
            pillar_trends.insert(
                pillar.clone(),
                PillarTrend {
                    change,
                    direction: direction_for(change),
                    volatility: std_dev(&series),
                },
            );
        }

        Ok(Some(TrendAnalysis {
            direction: direction_for(latest - first),
            volatility: std_dev(&overall),
            average_score: overall.iter().sum::<f64>() / overall.len() as f64,
            latest_score: latest,
            first_score: first,
            evaluations: historical_scores.len(),
            pillar_trends,
        }))
    }
}

// ── Trend types ────────────────────────────────────────────────────────

/// Direction of a score series, with a 0.05 dead-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Change above the dead-band.
    Improving,
    /// Change below the negative dead-band.
    Declining,
    /// Change within the dead-band.
    Stable,
}

/// Per-pillar trend summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarTrend {
    /// Latest minus first score.
    pub change: f64,
    /// Direction under the dead-band.
    pub direction: TrendDirection,
    /// Standard deviation of the pillar series.
    pub volatility: f64,
}

/// Trend analysis over a sequence of aggregations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Overall direction.
    pub direction: TrendDirection,
    /// Standard deviation of the overall scores.
    pub volatility: f64,
    /// Mean of the overall scores.
    pub average_score: f64,
    /// The most recent overall score.
    pub latest_score: f64,
    /// The first overall score.
    pub first_score: f64,
    /// Number of evaluations analyzed.
    pub evaluations: usize,
    /// Per-pillar change and direction.
    pub pillar_trends: BTreeMap<String, PillarTrend>,
}

fn direction_for(change: f64) -> TrendDirection {
    if change > 0.05 {
        TrendDirection::Improving
    } else if change < -0.05 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

// ── Reductions ─────────────────────────────────────────────────────────

fn calculate_aggregate(scores: &[PillarScore], strategy: AggregationStrategy) -> f64 {
    let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
    let weights: Vec<f64> = scores.iter().map(|s| s.weight).collect();
    let n = values.len() as f64;
    let weight_sum: f64 = weights.iter().sum();

    match strategy {
        AggregationStrategy::WeightedAverage => {
            if weight_sum == 0.0 {
                values.iter().sum::<f64>() / n
            } else {
                values
                    .iter()
                    .zip(&weights)
                    .map(|(v, w)| v * w)
                    .sum::<f64>()
                    / weight_sum
            }
        }
        AggregationStrategy::ArithmeticMean => values.iter().sum::<f64>() / n,
        AggregationStrategy::GeometricMean => {
            let log_mean = values
                .iter()
                .map(|v| v.clamp(GEO_EPSILON, 1.0).ln())
                .sum::<f64>()
                / n;
            log_mean.exp()
        }
        AggregationStrategy::HarmonicMean => {
            n / values
                .iter()
                .map(|v| 1.0 / v.clamp(GEO_EPSILON, 1.0))
                .sum::<f64>()
        }
        AggregationStrategy::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationStrategy::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationStrategy::Median => median(&values),
        AggregationStrategy::WeightedProduct => {
            if weight_sum == 0.0 {
                // Degenerate weights: every exponent is zero.
                1.0
            } else {
                values
                    .iter()
                    .zip(&weights)
                    .map(|(v, w)| v.clamp(GEO_EPSILON, 1.0).powf(w / weight_sum))
                    .product()
            }
        }
        AggregationStrategy::Percentile90 => percentile_linear(&values, 10.0),
        AggregationStrategy::Percentile95 => percentile_linear(&values, 5.0),
    }
}

fn calculate_contributions(
    scores: &[PillarScore],
    strategy: AggregationStrategy,
) -> BTreeMap<String, f64> {
    let mut contributions = BTreeMap::new();
    let total_weight: f64 = scores.iter().map(|s| s.weight).sum();
    let n = scores.len() as f64;

    match strategy {
        AggregationStrategy::WeightedAverage | AggregationStrategy::WeightedProduct => {
            for s in scores {
                let weight_fraction = if total_weight > 0.0 {
                    s.weight / total_weight
                } else {
                    1.0 / n
                };
                contributions.insert(s.pillar_name.clone(), s.score * weight_fraction);
            }
        }
        AggregationStrategy::Minimum => {
            let min = scores.iter().map(|s| s.score).fold(f64::INFINITY, f64::min);
            for s in scores {
                let c = if s.score == min { 1.0 } else { 0.0 };
                contributions.insert(s.pillar_name.clone(), c);
            }
        }
        AggregationStrategy::Maximum => {
            let max = scores
                .iter()
                .map(|s| s.score)
                .fold(f64::NEG_INFINITY, f64::max);
            for s in scores {
                let c = if s.score == max { 1.0 } else { 0.0 };
                contributions.insert(s.pillar_name.clone(), c);
            }
        }
        _ => {
            for s in scores {
                contributions.insert(s.pillar_name.clone(), s.score / n);
            }
        }
    }

    contributions
}

fn calculate_confidence(scores: &[PillarScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total_weight: f64 = scores.iter().map(|s| s.weight).sum();
    if total_weight == 0.0 {
        return scores.iter().map(|s| s.confidence).sum::<f64>() / scores.len() as f64;
    }
    scores
        .iter()
        .map(|s| s.confidence * s.weight)
        .sum::<f64>()
        / total_weight
}

fn risk_level_for(score: f64) -> RiskLevel {
    if score >= 0.9 {
        RiskLevel::Low
    } else if score >= 0.7 {
        RiskLevel::Medium
    } else if score >= 0.5 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn percentile_linear(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scores(entries: &[(&str, f64, f64, f64)]) -> Vec<PillarScore> {
        entries
            .iter()
            .map(|(name, score, confidence, weight)| {
                PillarScore::new(*name, *score)
                    .confidence(*confidence)
                    .weight(*weight)
            })
            .collect()
    }

    #[test]
    fn weighted_average_matches_hand_computation() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("pA", 0.8, 1.0, 2.0), ("pB", 0.4, 1.0, 1.0)]);

        let result = aggregator.aggregate(&input, None, None).unwrap();
        assert!((result.overall_score - (0.8 * 2.0 + 0.4) / 3.0).abs() < 1e-9);
        assert!((result.pillar_contributions["pA"] - 0.8 * (2.0 / 3.0)).abs() < 1e-9);
        assert!((result.pillar_contributions["pB"] - 0.4 * (1.0 / 3.0)).abs() < 1e-9);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn single_score_is_the_aggregate() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("only", 0.63, 1.0, 2.5)]);
        let result = aggregator
            .aggregate(&input, Some(AggregationStrategy::WeightedAverage), None)
            .unwrap();
        assert!((result.overall_score - 0.63).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_fall_back_to_mean() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("a", 0.2, 1.0, 0.0), ("b", 0.8, 1.0, 0.0)]);
        let result = aggregator
            .aggregate(&input, Some(AggregationStrategy::WeightedAverage), None)
            .unwrap();
        assert!((result.overall_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mean_strategies() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("a", 0.4, 1.0, 1.0), ("b", 0.9, 1.0, 1.0)]);

        let arith = aggregator
            .aggregate(&input, Some(AggregationStrategy::ArithmeticMean), None)
            .unwrap();
        assert!((arith.overall_score - 0.65).abs() < 1e-12);

        let geo = aggregator
            .aggregate(&input, Some(AggregationStrategy::GeometricMean), None)
            .unwrap();
        assert!((geo.overall_score - (0.4f64 * 0.9).sqrt()).abs() < 1e-9);

        let harm = aggregator
            .aggregate(&input, Some(AggregationStrategy::HarmonicMean), None)
            .unwrap();
        assert!((harm.overall_score - 2.0 / (1.0 / 0.4 + 1.0 / 0.9)).abs() < 1e-9);
    }

    #[test]
    fn extremes_and_median() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[
            ("a", 0.3, 1.0, 1.0),
            ("b", 0.5, 1.0, 1.0),
            ("c", 0.9, 1.0, 1.0),
        ]);

        let min = aggregator
            .aggregate(&input, Some(AggregationStrategy::Minimum), None)
            .unwrap();
        assert!((min.overall_score - 0.3).abs() < 1e-12);
        assert!((min.pillar_contributions["a"] - 1.0).abs() < 1e-12);
        assert!((min.pillar_contributions["b"]).abs() < 1e-12);

        let max = aggregator
            .aggregate(&input, Some(AggregationStrategy::Maximum), None)
            .unwrap();
        assert!((max.overall_score - 0.9).abs() < 1e-12);
        assert!((max.pillar_contributions["c"] - 1.0).abs() < 1e-12);

        let median = aggregator
            .aggregate(&input, Some(AggregationStrategy::Median), None)
            .unwrap();
        assert!((median.overall_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weighted_product_is_weighted_geometric_mean() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("a", 0.5, 1.0, 3.0), ("b", 0.8, 1.0, 1.0)]);
        let result = aggregator
            .aggregate(&input, Some(AggregationStrategy::WeightedProduct), None)
            .unwrap();
        let expected = 0.5f64.powf(0.75) * 0.8f64.powf(0.25);
        assert!((result.overall_score - expected).abs() < 1e-9);
    }

    #[test]
    fn lower_tail_percentiles() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[
            ("a", 0.1, 1.0, 1.0),
            ("b", 0.5, 1.0, 1.0),
            ("c", 0.9, 1.0, 1.0),
        ]);

        let p90 = aggregator
            .aggregate(&input, Some(AggregationStrategy::Percentile90), None)
            .unwrap();
        // 10th percentile of [0.1, 0.5, 0.9] with linear interpolation.
        assert!((p90.overall_score - 0.18).abs() < 1e-9);

        let p95 = aggregator
            .aggregate(&input, Some(AggregationStrategy::Percentile95), None)
            .unwrap();
        assert!((p95.overall_score - 0.14).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_excluded_by_default() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("kept", 0.8, 0.9, 1.0), ("dropped", 0.1, 0.2, 1.0)]);
        let result = aggregator.aggregate(&input, None, None).unwrap();
        assert_eq!(result.pillar_scores.len(), 1);
        assert!((result.overall_score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn low_confidence_default_policy_substitutes() {
        let aggregator = ScoreAggregator::default()
            .confidence_policy(ConfidencePolicy::Default)
            .default_score(0.5);
        let input = scores(&[("a", 0.8, 0.9, 1.0), ("b", 0.1, 0.2, 1.0)]);
        let result = aggregator.aggregate(&input, None, None).unwrap();
        assert_eq!(result.pillar_scores.len(), 2);
        assert!((result.pillar_scores["b"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn low_confidence_fail_policy_errors() {
        let aggregator = ScoreAggregator::default().confidence_policy(ConfidencePolicy::Fail);
        let input = scores(&[("bad", 0.8, 0.1, 1.0)]);
        let err = aggregator.aggregate(&input, None, None).unwrap_err();
        assert!(matches!(err, ScoringError::LowConfidence { .. }));
    }

    #[test]
    fn empty_set_yields_default_with_unknown_risk() {
        let aggregator = ScoreAggregator::default();
        let result = aggregator.aggregate(&[], None, None).unwrap();
        assert!((result.overall_score - 0.5).abs() < 1e-12);
        assert!(result.confidence.abs() < 1e-12);
        assert_eq!(result.risk_level, RiskLevel::Unknown);
        assert!(result.pillar_scores.is_empty());
    }

    #[test]
    fn weight_overrides_apply() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("a", 1.0, 1.0, 1.0), ("b", 0.0, 1.0, 1.0)]);
        let mut overrides = FxHashMap::default();
        overrides.insert("a".to_string(), 3.0);

        let result = aggregator.aggregate(&input, None, Some(&overrides)).unwrap();
        assert!((result.overall_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_weight_averaged() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("a", 0.5, 1.0, 3.0), ("b", 0.5, 0.6, 1.0)]);
        let result = aggregator.aggregate(&input, None, None).unwrap();
        assert!((result.confidence - (1.0 * 3.0 + 0.6) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn risk_mapping_bands() {
        let aggregator = ScoreAggregator::default();
        for (score, expected) in [
            (0.95, RiskLevel::Low),
            (0.75, RiskLevel::Medium),
            (0.55, RiskLevel::High),
            (0.3, RiskLevel::Critical),
        ] {
            let result = aggregator
                .aggregate(&scores(&[("p", score, 1.0, 1.0)]), None, None)
                .unwrap();
            assert_eq!(result.risk_level, expected, "score {score}");
        }
    }

    #[test]
    fn compare_runs_every_strategy() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[("a", 0.4, 1.0, 1.0), ("b", 0.8, 1.0, 1.0)]);
        let results = aggregator.compare_aggregations(&input).unwrap();
        assert_eq!(results.len(), 10);
        assert!((results["minimum"].overall_score - 0.4).abs() < 1e-12);
        assert!((results["maximum"].overall_score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn categories_aggregate_subsets() {
        let aggregator = ScoreAggregator::default();
        let input = scores(&[
            ("fairness", 0.8, 1.0, 1.0),
            ("privacy", 0.6, 1.0, 1.0),
            ("accuracy", 0.9, 1.0, 1.0),
        ]);
        let mapping = vec![
            (
                "ethics".to_string(),
                vec!["fairness".to_string(), "privacy".to_string()],
            ),
            ("performance".to_string(), vec!["accuracy".to_string()]),
            ("absent".to_string(), vec!["nothing".to_string()]),
        ];

        let results = aggregator.aggregate_by_category(&input, &mapping, None);
        assert_eq!(results.len(), 2);
        assert!((results["ethics"].overall_score - 0.7).abs() < 1e-12);
        assert!((results["performance"].overall_score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn trend_analysis_detects_direction() {
        let aggregator = ScoreAggregator::default();
        let history = vec![
            scores(&[("p", 0.5, 1.0, 1.0)]),
            scores(&[("p", 0.6, 1.0, 1.0)]),
            scores(&[("p", 0.8, 1.0, 1.0)]),
        ];

        let trend = aggregator.trend_analysis(&history, None).unwrap().unwrap();
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert!((trend.first_score - 0.5).abs() < 1e-12);
        assert!((trend.latest_score - 0.8).abs() < 1e-12);
        assert_eq!(trend.evaluations, 3);
        assert_eq!(
            trend.pillar_trends["p"].direction,
            TrendDirection::Improving
        );
        assert!((trend.pillar_trends["p"].change - 0.3).abs() < 1e-9);
    }

    #[test]
    fn trend_dead_band_is_stable() {
        let aggregator = ScoreAggregator::default();
        let history = vec![
            scores(&[("p", 0.70, 1.0, 1.0)]),
            scores(&[("p", 0.73, 1.0, 1.0)]),
        ];
        let trend = aggregator.trend_analysis(&history, None).unwrap().unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn trend_requires_two_points() {
        let aggregator = ScoreAggregator::default();
        let history = vec![scores(&[("p", 0.5, 1.0, 1.0)])];
        assert!(aggregator.trend_analysis(&history, None).unwrap().is_none());
    }

    proptest! {
        // Monotonicity: raising any score never lowers the aggregate.
        #[test]
        fn raising_a_score_never_lowers_the_aggregate(
            base in proptest::collection::vec(0.0f64..=1.0, 2..6),
            idx in 0usize..6,
            bump in 0.0f64..=0.5,
        ) {
            let idx = idx % base.len();
            let strategies = [
                AggregationStrategy::WeightedAverage,
                AggregationStrategy::ArithmeticMean,
                AggregationStrategy::Minimum,
                AggregationStrategy::Maximum,
                AggregationStrategy::Median,
            ];

            let aggregator = ScoreAggregator::default();
            let input: Vec<PillarScore> = base
                .iter()
                .enumerate()
                .map(|(i, v)| PillarScore::new(format!("p{i}"), *v))
                .collect();

            let mut bumped = input.clone();
            bumped[idx].score = (bumped[idx].score + bump).min(1.0);

            for strategy in strategies {
                let before = aggregator.aggregate(&input, Some(strategy), None).unwrap();
                let after = aggregator.aggregate(&bumped, Some(strategy), None).unwrap();
                prop_assert!(
                    after.overall_score >= before.overall_score - 1e-12,
                    "{strategy:?} decreased from {} to {}",
                    before.overall_score,
                    after.overall_score,
                );
            }
        }

        // Weighted contributions sum to the overall score.
        #[test]
        fn weighted_contributions_sum_to_overall(
            entries in proptest::collection::vec((0.0f64..=1.0, 0.1f64..=5.0), 1..6),
        ) {
            let aggregator = ScoreAggregator::default();
            let input: Vec<PillarScore> = entries
                .iter()
                .enumerate()
                .map(|(i, (score, weight))| {
                    PillarScore::new(format!("p{i}"), *score).weight(*weight)
                })
                .collect();

            let result = aggregator
                .aggregate(&input, Some(AggregationStrategy::WeightedAverage), None)
                .unwrap();
            let contribution_sum: f64 = result.pillar_contributions.values().sum();
            prop_assert!((contribution_sum - result.overall_score).abs() < 1e-9);
        }
    }
}
