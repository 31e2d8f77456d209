//! Pillar weight presets and blends.
//!
//! A [`PillarWeights`] set always sums to 1.0.  The [`WeightManager`]
//! provides industry presets and supports weighted blends of them plus
//! user-defined configurations.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ScoringError;

// ── WeightPreset ───────────────────────────────────────────────────────

/// Pre-defined weight configurations for common contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPreset {
    /// Equal weight to all pillars.
    Balanced,
    /// Prioritizes security, robustness, and content safety.
    SafetyFocused,
    /// Prioritizes fairness and explainability.
    FairnessFocused,
    /// Prioritizes privacy and security.
    PrivacyFocused,
    /// Prioritizes accuracy and performance metrics.
    PerformanceFocused,
    /// Weights aligned with EU AI Act requirements.
    RegulatoryEuAiAct,
    /// Weights aligned with SOC 2 Trust Service Criteria.
    RegulatorySoc2,
    /// Healthcare applications (HIPAA posture).
    Healthcare,
    /// Financial services (fair-lending posture).
    Finance,
    /// Content moderation workloads.
    ContentModeration,
}

impl WeightPreset {
    /// Every preset.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::Balanced,
            Self::SafetyFocused,
            Self::FairnessFocused,
            Self::PrivacyFocused,
            Self::PerformanceFocused,
            Self::RegulatoryEuAiAct,
            Self::RegulatorySoc2,
            Self::Healthcare,
            Self::Finance,
            Self::ContentModeration,
        ]
    }

    fn raw_weights(self) -> Vec<(&'static str, f64)> {
        match self {
            Self::Balanced => vec![
                ("accuracy", 1.0),
                ("robustness", 1.0),
                ("fairness", 1.0),
                ("privacy", 1.0),
                ("security", 1.0),
                ("explainability", 1.0),
                ("toxicity", 1.0),
                ("groundedness", 1.0),
            ],
            Self::SafetyFocused => vec![
                ("accuracy", 0.5),
                ("robustness", 1.5),
                ("fairness", 1.0),
                ("privacy", 1.0),
                ("security", 2.0),
                ("explainability", 0.5),
                ("toxicity", 2.0),
                ("groundedness", 1.0),
            ],
            Self::FairnessFocused => vec![
                ("accuracy", 0.8),
                ("robustness", 0.8),
                ("fairness", 3.0),
                ("privacy", 1.0),
                ("security", 0.8),
                ("explainability", 1.5),
                ("toxicity", 1.0),
                ("groundedness", 0.8),
            ],
            Self::PrivacyFocused => vec![
                ("accuracy", 0.5),
                ("robustness", 0.8),
                ("fairness", 1.0),
                ("privacy", 3.0),
                ("security", 1.5),
                ("explainability", 0.8),
                ("toxicity", 0.8),
                ("groundedness", 0.8),
            ],
            Self::PerformanceFocused => vec![
                ("accuracy", 3.0),
                ("robustness", 1.5),
                ("fairness", 0.8),
                ("privacy", 0.5),
                ("security", 0.8),
                ("explainability", 0.5),
                ("toxicity", 0.5),
                ("groundedness", 1.5),
            ],
            Self::RegulatoryEuAiAct => vec![
                ("accuracy", 1.0),
                ("robustness", 1.5),
                ("fairness", 2.0),
                ("privacy", 2.0),
                ("security", 1.5),
                ("explainability", 2.5),
                ("toxicity", 1.5),
                ("groundedness", 1.0),
                ("human_oversight", 2.0),
                ("transparency", 2.5),
                ("data_governance", 2.0),
            ],
            Self::RegulatorySoc2 => vec![
                ("accuracy", 0.8),
                ("robustness", 1.0),
                ("fairness", 0.8),
                ("privacy", 2.5),
                ("security", 3.0),
                ("explainability", 1.0),
                ("toxicity", 0.5),
                ("groundedness", 0.5),
                ("availability", 2.0),
                ("confidentiality", 2.5),
                ("processing_integrity", 2.0),
            ],
            Self::Healthcare => vec![
                ("accuracy", 3.0),
                ("robustness", 2.0),
                ("fairness", 2.5),
                ("privacy", 3.0),
                ("security", 2.0),
                ("explainability", 2.5),
                ("toxicity", 1.0),
                ("groundedness", 2.5),
                ("clinical_validity", 3.0),
                ("patient_safety", 3.0),
            ],
            Self::Finance => vec![
                ("accuracy", 2.5),
                ("robustness", 2.0),
                ("fairness", 3.0),
                ("privacy", 2.0),
                ("security", 2.5),
                ("explainability", 2.5),
                ("toxicity", 0.5),
                ("groundedness", 1.5),
                ("model_governance", 2.5),
                ("audit_trail", 2.0),
            ],
            Self::ContentModeration => vec![
                ("accuracy", 1.5),
                ("robustness", 1.5),
                ("fairness", 2.0),
                ("privacy", 1.0),
                ("security", 1.0),
                ("explainability", 1.5),
                ("toxicity", 3.0),
                ("groundedness", 0.5),
                ("hate_speech_detection", 3.0),
                ("misinformation_detection", 2.5),
                ("violence_detection", 2.5),
            ],
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::SafetyFocused => "safety_focused",
            Self::FairnessFocused => "fairness_focused",
            Self::PrivacyFocused => "privacy_focused",
            Self::PerformanceFocused => "performance_focused",
            Self::RegulatoryEuAiAct => "regulatory_eu_ai_act",
            Self::RegulatorySoc2 => "regulatory_soc2",
            Self::Healthcare => "healthcare",
            Self::Finance => "finance",
            Self::ContentModeration => "content_moderation",
        }
    }
}

// ── PillarWeights ──────────────────────────────────────────────────────

/// A named weight set, normalized to sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarWeights {
    /// Configuration name.
    pub name: String,
    /// Pillar → normalized weight.
    pub weights: BTreeMap<String, f64>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

impl PillarWeights {
    /// Create a weight set; weights are normalized to sum to 1.0 (a
    /// zero-sum set is left untouched).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        weights: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        let mut set = Self {
            name: name.into(),
            weights: weights.into_iter().collect(),
            description: String::new(),
        };
        set.normalize();
        set
    }

    fn normalize(&mut self) {
        let total: f64 = self.weights.values().sum();
        if total > 0.0 {
            for weight in self.weights.values_mut() {
                *weight /= total;
            }
        }
    }

    /// The normalized weight for a pillar (0.0 when absent).
    #[must_use]
    pub fn get(&self, pillar: &str) -> f64 {
        self.weights.get(pillar).copied().unwrap_or(0.0)
    }

    /// Set a pillar's raw weight and re-normalize.
    pub fn set(&mut self, pillar: impl Into<String>, weight: f64) {
        self.weights.insert(pillar.into(), weight);
        self.normalize();
    }
}

// ── WeightManager ──────────────────────────────────────────────────────

/// Provides preset weight sets, blends, and custom registrations.
#[derive(Debug, Clone, Default)]
pub struct WeightManager {
    custom: FxHashMap<String, PillarWeights>,
}

impl WeightManager {
    /// Create an empty manager (presets are always available).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a preset as a normalized weight set.
    #[must_use]
    pub fn preset(&self, preset: WeightPreset) -> PillarWeights {
        PillarWeights::new(
            preset.label(),
            preset
                .raw_weights()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v)),
        )
    }

    /// Register a custom weight set under its name.
    pub fn register(&mut self, weights: PillarWeights) {
        self.custom.insert(weights.name.clone(), weights);
    }

    /// Look up a custom weight set.
    #[must_use]
    pub fn get_custom(&self, name: &str) -> Option<&PillarWeights> {
        self.custom.get(name)
    }

    /// Blend presets with mixing proportions into one normalized set.
    ///
    /// Each preset's normalized weights are scaled by its proportion
    /// and summed per pillar; the result is normalized again.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::EmptyBlend`] when no presets are given.
    pub fn blend(
        &self,
        parts: &[(WeightPreset, f64)],
        name: impl Into<String>,
    ) -> Result<PillarWeights, ScoringError> {
        if parts.is_empty() {
            return Err(ScoringError::EmptyBlend);
        }

        let mut combined: BTreeMap<String, f64> = BTreeMap::new();
        for (preset, proportion) in parts {
            let weights = self.preset(*preset);
            for (pillar, weight) in &weights.weights {
                *combined.entry(pillar.clone()).or_insert(0.0) += weight * proportion;
            }
        }

        Ok(PillarWeights::new(name, combined))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_normalize_to_one() {
        let manager = WeightManager::new();
        for preset in WeightPreset::all() {
            let weights = manager.preset(preset);
            let total: f64 = weights.weights.values().sum();
            assert!(
                (total - 1.0).abs() < 1e-9,
                "{} sums to {total}",
                weights.name,
            );
        }
    }

    #[test]
    fn balanced_is_uniform() {
        let weights = WeightManager::new().preset(WeightPreset::Balanced);
        for weight in weights.weights.values() {
            assert!((weight - 0.125).abs() < 1e-12);
        }
    }

    #[test]
    fn safety_preset_ranks_security_over_accuracy() {
        let weights = WeightManager::new().preset(WeightPreset::SafetyFocused);
        assert!(weights.get("security") > weights.get("accuracy"));
        assert!(weights.get("toxicity") > weights.get("explainability"));
    }

    #[test]
    fn set_renormalizes() {
        let mut weights = PillarWeights::new(
            "custom",
            [("a".to_string(), 1.0), ("b".to_string(), 1.0)],
        );
        weights.set("c", 2.0);
        let total: f64 = weights.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((weights.get("c") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_sum_weights_left_untouched() {
        let weights = PillarWeights::new(
            "degenerate",
            [("a".to_string(), 0.0), ("b".to_string(), 0.0)],
        );
        assert!(weights.get("a").abs() < f64::EPSILON);
    }

    #[test]
    fn blend_mixes_presets() {
        let manager = WeightManager::new();
        let blend = manager
            .blend(
                &[
                    (WeightPreset::Balanced, 0.5),
                    (WeightPreset::SafetyFocused, 0.5),
                ],
                "balanced_safety",
            )
            .unwrap();

        let total: f64 = blend.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        // Security sits between the balanced and safety-focused shares.
        let balanced = manager.preset(WeightPreset::Balanced).get("security");
        let safety = manager.preset(WeightPreset::SafetyFocused).get("security");
        assert!(blend.get("security") > balanced);
        assert!(blend.get("security") < safety);
    }

    #[test]
    fn empty_blend_is_an_error() {
        let err = WeightManager::new().blend(&[], "nothing").unwrap_err();
        assert!(matches!(err, ScoringError::EmptyBlend));
    }

    #[test]
    fn custom_registration_round_trip() {
        let mut manager = WeightManager::new();
        manager.register(PillarWeights::new(
            "ops",
            [("availability".to_string(), 3.0), ("security".to_string(), 1.0)],
        ));

        let weights = manager.get_custom("ops").unwrap();
        assert!((weights.get("availability") - 0.75).abs() < 1e-12);
    }
}
