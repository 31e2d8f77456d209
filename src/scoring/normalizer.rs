//! Score normalization — raw metric values onto the unit interval.
//!
//! Eight strategies with per-metric configuration.  Inversion (for
//! lower-is-better metrics) applies *after* the mapping, and clipping
//! is the final step.  Degenerate parameterizations (zero spread, zero
//! scale, missing tables) resolve to the midpoint 0.5 rather than
//! failing.
//!
//! Default configurations exist for well-known metric names; an
//! explicit config always overrides the default.  [`ScoreNormalizer::fit`]
//! derives a config from a reference sample set.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::ScoringError;

const LOG_EPSILON: f64 = 1e-10;

// ── NormalizationMethod ────────────────────────────────────────────────

/// Strategy for mapping a raw value onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// Linear map of `[min, max]` onto `[0, 1]`.
    MinMax,
    /// Z-score fed through the logistic function.
    ZScore,
    /// Median/IQR scaling.
    Robust,
    /// Log transform, then min-max over log bounds or logistic.
    LogTransform,
    /// Logistic transform with location/scale.
    Sigmoid,
    /// Linear interpolation within a percentile table.
    Percentile,
    /// Hyperbolic tangent shifted onto `[0, 1]`.
    Tanh,
    /// Percentile when a table is present, else z-score.
    Calibrated,
}

// ── NormalizationConfig ────────────────────────────────────────────────

/// Per-metric normalization parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Mapping strategy.
    pub method: Option<NormalizationMethod>,
    /// Lower bound for min-max / log mapping.
    pub min_value: Option<f64>,
    /// Upper bound for min-max / log mapping.
    pub max_value: Option<f64>,
    /// Location parameter (z-score, sigmoid, tanh).
    pub mean: Option<f64>,
    /// Scale parameter (z-score, sigmoid, tanh).
    pub std: Option<f64>,
    /// Median for robust scaling.
    pub median: Option<f64>,
    /// Interquartile range for robust scaling.
    pub iqr: Option<f64>,
    /// Sorted `(percentile, value)` table.
    pub percentiles: Option<Vec<(u8, f64)>>,
    /// Invert after mapping (lower raw = higher normalized).
    #[serde(default)]
    pub invert: bool,
    /// Clamp the final result to `[0, 1]` (default `true`).
    #[serde(default = "default_clip")]
    pub clip: bool,
}

fn default_clip() -> bool {
    true
}

impl NormalizationConfig {
    /// A config using the given method with all other fields unset.
    #[must_use]
    pub fn method(method: NormalizationMethod) -> Self {
        Self {
            method: Some(method),
            clip: true,
            ..Self::default()
        }
    }

    /// Min-max over `[min, max]`.
    #[must_use]
    pub fn min_max(min: f64, max: f64) -> Self {
        Self {
            min_value: Some(min),
            max_value: Some(max),
            ..Self::method(NormalizationMethod::MinMax)
        }
    }

    /// Mark the metric lower-is-better.
    #[must_use]
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

// ── NormalizationResult ────────────────────────────────────────────────

/// Outcome of one normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationResult {
    /// The raw input value.
    pub raw_value: f64,
    /// The normalized value.
    pub normalized_value: f64,
    /// The strategy that produced it.
    pub method_used: NormalizationMethod,
    /// Whether the mapping was inverted.
    pub inverted: bool,
    /// Whether the result was clamped.
    pub clipped: bool,
}

// ── Default metric configs ─────────────────────────────────────────────

fn default_configs() -> FxHashMap<String, NormalizationConfig> {
    let mut configs = FxHashMap::default();

    // Accuracy-like metrics (0-1, higher is better).
    for name in ["accuracy", "precision", "recall", "f1_score"] {
        configs.insert(name.to_string(), NormalizationConfig::min_max(0.0, 1.0));
    }
    // AUC: 0.5 is the random baseline.
    configs.insert("auc_roc".to_string(), NormalizationConfig::min_max(0.5, 1.0));

    // Error metrics (lower is better).
    for name in ["mse", "rmse", "mae"] {
        configs.insert(
            name.to_string(),
            NormalizationConfig::method(NormalizationMethod::LogTransform).inverted(),
        );
    }

    // Fairness metrics (closer to zero is better).
    configs.insert(
        "demographic_parity_diff".to_string(),
        NormalizationConfig::min_max(0.0, 1.0).inverted(),
    );
    configs.insert(
        "equalized_odds_diff".to_string(),
        NormalizationConfig::min_max(0.0, 1.0).inverted(),
    );
    // 4/5ths-rule band for disparate impact.
    configs.insert(
        "disparate_impact_ratio".to_string(),
        NormalizationConfig::min_max(0.8, 1.2),
    );

    // Privacy metrics.
    configs.insert(
        "epsilon".to_string(),
        NormalizationConfig::method(NormalizationMethod::LogTransform).inverted(),
    );
    configs.insert(
        "membership_inference_auc".to_string(),
        NormalizationConfig::min_max(0.5, 1.0).inverted(),
    );

    // Content-safety metrics.
    configs.insert(
        "toxicity_score".to_string(),
        NormalizationConfig::min_max(0.0, 1.0).inverted(),
    );
    configs.insert(
        "jailbreak_success_rate".to_string(),
        NormalizationConfig::min_max(0.0, 1.0).inverted(),
    );

    configs
}

// ── ScoreNormalizer ────────────────────────────────────────────────────

/// Normalizes raw evaluation metrics to a consistent `[0, 1]` scale.
#[derive(Debug, Clone)]
pub struct ScoreNormalizer {
    default_method: NormalizationMethod,
    configs: FxHashMap<String, NormalizationConfig>,
}

impl Default for ScoreNormalizer {
    fn default() -> Self {
        Self::new(NormalizationMethod::MinMax)
    }
}

impl ScoreNormalizer {
    /// Create a normalizer with the built-in metric configs.
    #[must_use]
    pub fn new(default_method: NormalizationMethod) -> Self {
        Self {
            default_method,
            configs: default_configs(),
        }
    }

    /// Normalize one value.
    ///
    /// Config resolution: an explicit `config` wins, then a stored
    /// config for `metric_name`, then the default method with no
    /// parameters.
    #[must_use]
    pub fn normalize(
        &self,
        value: f64,
        metric_name: Option<&str>,
        config: Option<&NormalizationConfig>,
    ) -> NormalizationResult {
        let resolved;
        let config = match config {
            Some(c) => c,
            None => match metric_name.and_then(|n| self.configs.get(n)) {
                Some(c) => c,
                None => {
                    resolved = NormalizationConfig::method(self.default_method);
                    &resolved
                }
            },
        };

        let method = config.method.unwrap_or(self.default_method);
        let mut normalized = apply_method(value, method, config);

        if config.invert {
            normalized = 1.0 - normalized;
        }
        let clipped = config.clip && !(0.0..=1.0).contains(&normalized);
        if config.clip {
            normalized = normalized.clamp(0.0, 1.0);
        }

        NormalizationResult {
            raw_value: value,
            normalized_value: normalized,
            method_used: method,
            inverted: config.invert,
            clipped,
        }
    }

    /// Normalize a batch of `(metric, value)` pairs.
    #[must_use]
    pub fn normalize_batch(
        &self,
        values: &FxHashMap<String, f64>,
    ) -> FxHashMap<String, NormalizationResult> {
        values
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    self.normalize(*value, Some(name.as_str()), None),
                )
            })
            .collect()
    }

    /// Fit a config to a reference sample set and store it under
    /// `metric_name`.
    ///
    /// Derives min, max, mean, standard deviation, median, IQR, and the
    /// 5/10/25/50/75/90/95 percentiles from the samples.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::EmptySamples`] for an empty sample set.
    pub fn fit(
        &mut self,
        metric_name: &str,
        samples: &[f64],
        method: Option<NormalizationMethod>,
        invert: bool,
    ) -> Result<NormalizationConfig, ScoringError> {
        if samples.is_empty() {
            return Err(ScoringError::EmptySamples {
                metric: metric_name.to_string(),
            });
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let config = NormalizationConfig {
            method: Some(method.unwrap_or(self.default_method)),
            min_value: Some(sorted[0]),
            max_value: Some(sorted[sorted.len() - 1]),
            mean: Some(mean),
            std: Some(variance.sqrt()),
            median: Some(percentile_of(&sorted, 50.0)),
            iqr: Some(percentile_of(&sorted, 75.0) - percentile_of(&sorted, 25.0)),
            percentiles: Some(
                [5u8, 10, 25, 50, 75, 90, 95]
                    .iter()
                    .map(|&p| (p, percentile_of(&sorted, f64::from(p))))
                    .collect(),
            ),
            invert,
            clip: true,
        };

        self.configs.insert(metric_name.to_string(), config.clone());
        Ok(config)
    }

    /// The stored config for a metric, if any.
    #[must_use]
    pub fn get_config(&self, metric_name: &str) -> Option<&NormalizationConfig> {
        self.configs.get(metric_name)
    }

    /// Store a config for a metric.
    pub fn set_config(&mut self, metric_name: impl Into<String>, config: NormalizationConfig) {
        self.configs.insert(metric_name.into(), config);
    }
}

// ── Strategy implementations ───────────────────────────────────────────

fn apply_method(value: f64, method: NormalizationMethod, config: &NormalizationConfig) -> f64 {
    match method {
        NormalizationMethod::MinMax => min_max(value, config),
        NormalizationMethod::ZScore => z_score(value, config),
        NormalizationMethod::Robust => robust(value, config),
        NormalizationMethod::LogTransform => log_transform(value, config),
        NormalizationMethod::Sigmoid => sigmoid(value, config),
        NormalizationMethod::Percentile => percentile(value, config),
        NormalizationMethod::Tanh => tanh(value, config),
        NormalizationMethod::Calibrated => {
            if config.percentiles.is_some() {
                percentile(value, config)
            } else {
                z_score(value, config)
            }
        }
    }
}

fn min_max(value: f64, config: &NormalizationConfig) -> f64 {
    let min = config.min_value.unwrap_or(0.0);
    let max = config.max_value.unwrap_or(1.0);
    if max == min {
        return 0.5;
    }
    (value - min) / (max - min)
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn z_score(value: f64, config: &NormalizationConfig) -> f64 {
    let mean = config.mean.unwrap_or(0.0);
    let std = config.std.unwrap_or(1.0);
    if std == 0.0 {
        return 0.5;
    }
    logistic((value - mean) / std)
}

fn robust(value: f64, config: &NormalizationConfig) -> f64 {
    let median = config.median.unwrap_or(0.5);
    let iqr = config.iqr.unwrap_or(1.0);
    if iqr == 0.0 {
        return 0.5;
    }
    (value - median) / (2.0 * iqr) + 0.5
}

fn log_transform(value: f64, config: &NormalizationConfig) -> f64 {
    let log_val = value.max(LOG_EPSILON).ln();

    match (config.min_value, config.max_value) {
        (Some(min), Some(max)) => {
            let log_min = min.max(LOG_EPSILON).ln();
            let log_max = max.max(LOG_EPSILON).ln();
            if log_max == log_min {
                return 0.5;
            }
            (log_val - log_min) / (log_max - log_min)
        }
        _ => logistic(log_val),
    }
}

fn sigmoid(value: f64, config: &NormalizationConfig) -> f64 {
    let mean = config.mean.unwrap_or(0.0);
    let scale = config.std.unwrap_or(1.0);
    if scale == 0.0 {
        return 0.5;
    }
    logistic((value - mean) / scale)
}

fn percentile(value: f64, config: &NormalizationConfig) -> f64 {
    let Some(table) = &config.percentiles else {
        return 0.5;
    };
    if table.is_empty() {
        return 0.5;
    }

    let mut sorted = table.clone();
    sorted.sort_by_key(|(p, _)| *p);

    for (i, &(pct, pct_value)) in sorted.iter().enumerate() {
        if value <= pct_value {
            if i == 0 {
                return f64::from(pct) / 100.0;
            }
            let (prev_pct, prev_value) = sorted[i - 1];
            let ratio = if pct_value == prev_value {
                0.5
            } else {
                (value - prev_value) / (pct_value - prev_value)
            };
            return (f64::from(prev_pct) + ratio * f64::from(pct - prev_pct)) / 100.0;
        }
    }

    // Above every tabulated percentile.
    1.0
}

fn tanh(value: f64, config: &NormalizationConfig) -> f64 {
    let mean = config.mean.unwrap_or(0.0);
    let scale = config.std.unwrap_or(1.0);
    if scale == 0.0 {
        return 0.5;
    }
    (((value - mean) / scale).tanh() + 1.0) / 2.0
}

/// Linear-interpolation percentile over a sorted slice.
fn percentile_of(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
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

    fn normalizer() -> ScoreNormalizer {
        ScoreNormalizer::default()
    }

    #[test]
    fn min_max_is_linear() {
        let config = NormalizationConfig::min_max(0.0, 10.0);
        let result = normalizer().normalize(2.5, None, Some(&config));
        assert!((result.normalized_value - 0.25).abs() < 1e-12);
    }

    #[test]
    fn min_max_equal_bounds_is_midpoint() {
        let config = NormalizationConfig::min_max(3.0, 3.0);
        let result = normalizer().normalize(3.0, None, Some(&config));
        assert!((result.normalized_value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn invert_applies_after_mapping() {
        let config = NormalizationConfig::min_max(0.0, 10.0).inverted();
        let result = normalizer().normalize(2.5, None, Some(&config));
        assert!((result.normalized_value - 0.75).abs() < 1e-12);
        assert!(result.inverted);
    }

    #[test]
    fn clip_clamps_out_of_range() {
        let config = NormalizationConfig::min_max(0.0, 1.0);
        let result = normalizer().normalize(1.5, None, Some(&config));
        assert!((result.normalized_value - 1.0).abs() < 1e-12);
        assert!(result.clipped);
    }

    #[test]
    fn z_score_uses_logistic() {
        let config = NormalizationConfig {
            mean: Some(10.0),
            std: Some(2.0),
            ..NormalizationConfig::method(NormalizationMethod::ZScore)
        };
        let at_mean = normalizer().normalize(10.0, None, Some(&config));
        assert!((at_mean.normalized_value - 0.5).abs() < 1e-12);

        let above = normalizer().normalize(12.0, None, Some(&config));
        assert!((above.normalized_value - logistic(1.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_spread_degenerates_to_midpoint() {
        for method in [
            NormalizationMethod::ZScore,
            NormalizationMethod::Sigmoid,
            NormalizationMethod::Tanh,
        ] {
            let config = NormalizationConfig {
                mean: Some(1.0),
                std: Some(0.0),
                ..NormalizationConfig::method(method)
            };
            let result = normalizer().normalize(5.0, None, Some(&config));
            assert!(
                (result.normalized_value - 0.5).abs() < 1e-12,
                "{method:?} with zero scale must yield 0.5",
            );
        }

        let config = NormalizationConfig {
            median: Some(1.0),
            iqr: Some(0.0),
            ..NormalizationConfig::method(NormalizationMethod::Robust)
        };
        let result = normalizer().normalize(5.0, None, Some(&config));
        assert!((result.normalized_value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn robust_centers_on_median() {
        let config = NormalizationConfig {
            median: Some(4.0),
            iqr: Some(2.0),
            ..NormalizationConfig::method(NormalizationMethod::Robust)
        };
        let result = normalizer().normalize(6.0, None, Some(&config));
        // (6-4)/(2*2) + 0.5 = 1.0
        assert!((result.normalized_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn log_transform_with_bounds() {
        let config = NormalizationConfig {
            min_value: Some(1.0),
            max_value: Some(100.0),
            ..NormalizationConfig::method(NormalizationMethod::LogTransform)
        };
        let result = normalizer().normalize(10.0, None, Some(&config));
        // ln(10) is exactly halfway between ln(1) and ln(100).
        assert!((result.normalized_value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tanh_maps_onto_unit_interval() {
        let config = NormalizationConfig {
            mean: Some(0.0),
            std: Some(1.0),
            ..NormalizationConfig::method(NormalizationMethod::Tanh)
        };
        let result = normalizer().normalize(0.0, None, Some(&config));
        assert!((result.normalized_value - 0.5).abs() < 1e-12);

        let high = normalizer().normalize(100.0, None, Some(&config));
        assert!(high.normalized_value > 0.99);
    }

    #[test]
    fn percentile_interpolates_within_bracket() {
        let config = NormalizationConfig {
            percentiles: Some(vec![(10, 1.0), (50, 5.0), (90, 9.0)]),
            ..NormalizationConfig::method(NormalizationMethod::Percentile)
        };

        // Halfway between the 10th and 50th percentile values.
        let result = normalizer().normalize(3.0, None, Some(&config));
        assert!((result.normalized_value - 0.3).abs() < 1e-12);

        // Below the table.
        let below = normalizer().normalize(0.5, None, Some(&config));
        assert!((below.normalized_value - 0.1).abs() < 1e-12);

        // Above the table.
        let above = normalizer().normalize(20.0, None, Some(&config));
        assert!((above.normalized_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn calibrated_prefers_percentile_table() {
        let with_table = NormalizationConfig {
            percentiles: Some(vec![(10, 1.0), (90, 9.0)]),
            mean: Some(0.0),
            std: Some(1.0),
            ..NormalizationConfig::method(NormalizationMethod::Calibrated)
        };
        let result = normalizer().normalize(5.0, None, Some(&with_table));
        assert!((result.normalized_value - 0.5).abs() < 1e-12);

        let without_table = NormalizationConfig {
            mean: Some(5.0),
            std: Some(1.0),
            ..NormalizationConfig::method(NormalizationMethod::Calibrated)
        };
        let result = normalizer().normalize(5.0, None, Some(&without_table));
        assert!((result.normalized_value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn known_metrics_use_default_configs() {
        let n = normalizer();

        // auc_roc maps [0.5, 1.0] onto [0, 1].
        let auc = n.normalize(0.75, Some("auc_roc"), None);
        assert!((auc.normalized_value - 0.5).abs() < 1e-12);

        // toxicity_score is inverted: low toxicity scores well.
        let tox = n.normalize(0.1, Some("toxicity_score"), None);
        assert!((tox.normalized_value - 0.9).abs() < 1e-12);

        // Unknown metrics fall back to the default method.
        let unknown = n.normalize(0.4, Some("made_up_metric"), None);
        assert!((unknown.normalized_value - 0.4).abs() < 1e-12);
    }

    #[test]
    fn explicit_config_overrides_default() {
        let n = normalizer();
        let config = NormalizationConfig::min_max(0.0, 2.0);
        let result = n.normalize(1.0, Some("accuracy"), Some(&config));
        assert!((result.normalized_value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fit_derives_summary_statistics() {
        let mut n = normalizer();
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let config = n
            .fit("latency_ms", &samples, Some(NormalizationMethod::MinMax), true)
            .unwrap();

        assert!((config.min_value.unwrap() - 1.0).abs() < 1e-12);
        assert!((config.max_value.unwrap() - 100.0).abs() < 1e-12);
        assert!((config.mean.unwrap() - 50.5).abs() < 1e-12);
        assert!((config.median.unwrap() - 50.5).abs() < 1e-12);
        assert!(config.invert);

        let table = config.percentiles.as_ref().unwrap();
        assert_eq!(table.len(), 7);

        // The fitted config is stored and applied by name.
        let result = n.normalize(100.0, Some("latency_ms"), None);
        assert!((result.normalized_value - 0.0).abs() < 1e-12);
    }

    #[test]
    fn fit_rejects_empty_samples() {
        let mut n = normalizer();
        let err = n.fit("metric", &[], None, false).unwrap_err();
        assert!(matches!(err, ScoringError::EmptySamples { .. }));
    }

    #[test]
    fn batch_normalizes_by_metric_name() {
        let n = normalizer();
        let mut values = FxHashMap::default();
        values.insert("accuracy".to_string(), 0.9);
        values.insert("toxicity_score".to_string(), 0.2);

        let results = n.normalize_batch(&values);
        assert!((results["accuracy"].normalized_value - 0.9).abs() < 1e-12);
        assert!((results["toxicity_score"].normalized_value - 0.8).abs() < 1e-12);
    }

    proptest! {
        // Identity: min-max over [0, 1] leaves unit-interval values alone.
        #[test]
        fn unit_min_max_is_identity(v in 0.0f64..=1.0) {
            let config = NormalizationConfig::min_max(0.0, 1.0);
            let result = ScoreNormalizer::default().normalize(v, None, Some(&config));
            prop_assert!((result.normalized_value - v).abs() < 1e-12);
        }

        // Every clipped result lands in the unit interval.
        #[test]
        fn clipped_results_are_in_unit_interval(
            v in -1e6f64..1e6,
            mean in -100.0f64..100.0,
            std in 0.0f64..100.0,
        ) {
            let config = NormalizationConfig {
                mean: Some(mean),
                std: Some(std),
                ..NormalizationConfig::method(NormalizationMethod::Sigmoid)
            };
            let result = ScoreNormalizer::default().normalize(v, None, Some(&config));
            prop_assert!((0.0..=1.0).contains(&result.normalized_value));
        }
    }
}
