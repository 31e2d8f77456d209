//! Regulatory compliance mapping.
//!
//! Maps aggregated pillar scores onto framework controls.  Frameworks
//! own their controls; the pillar relevance data lives in a flat table
//! of `(pillar, framework, control) → weight` tuples, so cross
//! references are values rather than owning links.
//!
//! Mappings are advisory: a control score is the relevance-weighted
//! average of the pillar scores it maps to, and the gap analysis lists
//! controls below a caller-supplied threshold with the most impactful
//! contributing pillar flagged.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Framework model ────────────────────────────────────────────────────

/// One control of a regulatory framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    /// Control identifier (e.g. `"art15-3"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

/// A regulatory framework and its controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Framework {
    /// Framework identifier (e.g. `"eu-ai-act"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The controls the framework declares.
    pub controls: Vec<Control>,
}

impl Framework {
    /// Look up a control by id.
    #[must_use]
    pub fn get_control(&self, control_id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == control_id)
    }
}

fn framework(id: &str, name: &str, controls: &[(&str, &str)]) -> Framework {
    Framework {
        id: id.to_string(),
        name: name.to_string(),
        controls: controls
            .iter()
            .map(|(cid, cname)| Control {
                id: (*cid).to_string(),
                name: (*cname).to_string(),
            })
            .collect(),
    }
}

/// The built-in framework catalog.
#[must_use]
pub fn builtin_frameworks() -> Vec<Framework> {
    vec![
        framework(
            "eu-ai-act",
            "EU AI Act",
            &[
                ("art9-1", "Risk Management System Establishment"),
                ("art9-2a", "Risk Identification and Analysis"),
                ("art9-2b", "Risk Estimation and Evaluation"),
                ("art9-4", "Risk Mitigation Measures"),
                ("art10-2", "Data Governance Practices"),
                ("art10-3", "Data Quality Requirements"),
                ("art10-5", "Bias Examination"),
                ("art13-1", "Transparency Design"),
                ("art13-3b", "Performance Characteristics"),
                ("art14-1", "Human Oversight Design"),
                ("art14-4", "Oversight Measures"),
                ("art15-1", "Appropriate Accuracy"),
                ("art15-3", "Robustness Requirements"),
                ("art15-4", "Cybersecurity Resilience"),
            ],
        ),
        framework(
            "nist-ai-rmf",
            "NIST AI Risk Management Framework",
            &[
                ("gov-1", "Legal and Regulatory Requirements"),
                ("gov-1.1", "AI Policies"),
                ("gov-3", "Workforce Diversity"),
                ("map-1", "Intended Purpose Documentation"),
                ("map-2", "AI Actor Identification"),
                ("map-3", "AI Lifecycle Risks"),
                ("mea-1", "Risk Metrics"),
                ("mea-2", "Trustworthiness Assessment"),
                ("mea-3", "Bias Assessment"),
                ("man-1", "Risk Prioritization"),
                ("man-2", "Risk Treatment"),
                ("man-4", "Continuous Monitoring"),
            ],
        ),
        framework(
            "soc2",
            "SOC 2 Trust Service Criteria",
            &[
                ("cc6.1", "Logical Access Security"),
                ("cc6.7", "Transmission Security"),
                ("a1.1", "AI System Availability"),
                ("c1.1", "AI Data Confidentiality"),
                ("pi1.1", "AI Processing Integrity"),
                ("p1.1", "AI Privacy Controls"),
            ],
        ),
        framework(
            "iso-42001",
            "ISO/IEC 42001",
            &[
                ("iso-4.1", "Understanding Context"),
                ("iso-6.1", "Risk and Opportunity Assessment"),
                ("iso-7.2", "Competence"),
                ("iso-8.1", "Operational Planning"),
                ("iso-8.4", "AI System Impact Assessment"),
                ("iso-9.1", "Monitoring and Measurement"),
            ],
        ),
        framework(
            "gdpr",
            "GDPR",
            &[
                ("art6", "Lawful Basis for Processing"),
                ("art22", "Automated Individual Decisions"),
                ("art25", "Privacy by Design"),
                ("art35", "DPIA for AI Systems"),
            ],
        ),
    ]
}

// ── Relevance table ────────────────────────────────────────────────────

/// One `(pillar, framework, control) → weight` tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceEntry {
    /// Evaluation pillar.
    pub pillar: String,
    /// Framework id.
    pub framework: String,
    /// Control id within the framework.
    pub control: String,
    /// Relevance weight in `[0, 1]`.
    pub weight: f64,
}

fn entry(pillar: &str, framework: &str, control: &str, weight: f64) -> RelevanceEntry {
    RelevanceEntry {
        pillar: pillar.to_string(),
        framework: framework.to_string(),
        control: control.to_string(),
        weight,
    }
}

/// The built-in pillar relevance table.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn builtin_relevance() -> Vec<RelevanceEntry> {
    vec![
        // Predictive pillars.
        entry("explain", "eu-ai-act", "art13-1", 1.0),
        entry("explain", "eu-ai-act", "art14-4", 0.7),
        entry("explain", "nist-ai-rmf", "mea-2", 0.8),
        entry("explain", "nist-ai-rmf", "gov-1.1", 0.5),
        entry("explain", "gdpr", "art22", 1.0),
        entry("explain", "iso-42001", "iso-9.1", 0.6),
        entry("actions", "eu-ai-act", "art15-3", 0.9),
        entry("actions", "eu-ai-act", "art15-4", 0.8),
        entry("actions", "nist-ai-rmf", "mea-2", 0.7),
        entry("actions", "nist-ai-rmf", "man-2", 0.8),
        entry("fairness", "eu-ai-act", "art10-5", 1.0),
        entry("fairness", "eu-ai-act", "art10-3", 0.7),
        entry("fairness", "nist-ai-rmf", "mea-3", 1.0),
        entry("fairness", "nist-ai-rmf", "gov-3", 0.6),
        entry("fairness", "gdpr", "art35", 0.7),
        entry("fairness", "iso-42001", "iso-8.4", 0.8),
        entry("robustness", "eu-ai-act", "art15-3", 1.0),
        entry("robustness", "eu-ai-act", "art9-2b", 0.8),
        entry("robustness", "nist-ai-rmf", "mea-2", 0.9),
        entry("robustness", "nist-ai-rmf", "man-4", 0.7),
        entry("robustness", "soc2", "a1.1", 0.8),
        entry("robustness", "soc2", "pi1.1", 0.7),
        entry("robustness", "iso-42001", "iso-9.1", 0.8),
        entry("trace", "eu-ai-act", "art10-2", 1.0),
        entry("trace", "eu-ai-act", "art10-3", 0.8),
        entry("trace", "nist-ai-rmf", "map-1", 0.6),
        entry("trace", "iso-42001", "iso-8.1", 0.7),
        entry("testing", "eu-ai-act", "art15-1", 1.0),
        entry("testing", "eu-ai-act", "art13-3b", 0.8),
        entry("testing", "nist-ai-rmf", "mea-1", 1.0),
        entry("testing", "nist-ai-rmf", "mea-2", 0.8),
        entry("testing", "soc2", "pi1.1", 0.8),
        entry("testing", "iso-42001", "iso-9.1", 0.9),
        entry("imitation", "eu-ai-act", "art15-4", 0.7),
        entry("imitation", "soc2", "c1.1", 0.9),
        entry("privacy", "eu-ai-act", "art10-2", 0.7),
        entry("privacy", "nist-ai-rmf", "map-3", 0.6),
        entry("privacy", "soc2", "p1.1", 1.0),
        entry("privacy", "soc2", "c1.1", 0.7),
        entry("privacy", "gdpr", "art6", 0.8),
        entry("privacy", "gdpr", "art25", 1.0),
        entry("privacy", "gdpr", "art35", 0.9),
        // Generative pillars.
        entry("security", "eu-ai-act", "art15-4", 1.0),
        entry("security", "eu-ai-act", "art9-4", 0.8),
        entry("security", "nist-ai-rmf", "mea-2", 0.8),
        entry("security", "nist-ai-rmf", "man-2", 0.9),
        entry("security", "soc2", "cc6.1", 1.0),
        entry("security", "soc2", "cc6.7", 0.8),
        entry("toxicity", "eu-ai-act", "art9-2a", 0.8),
        entry("toxicity", "nist-ai-rmf", "map-3", 0.7),
        entry("toxicity", "nist-ai-rmf", "mea-2", 0.6),
        // Cross-cutting governance.
        entry("governance", "eu-ai-act", "art9-1", 1.0),
        entry("governance", "eu-ai-act", "art14-1", 0.8),
        entry("governance", "nist-ai-rmf", "gov-1", 1.0),
        entry("governance", "nist-ai-rmf", "gov-1.1", 1.0),
        entry("governance", "nist-ai-rmf", "map-1", 0.8),
        entry("governance", "nist-ai-rmf", "map-2", 0.9),
        entry("governance", "nist-ai-rmf", "man-1", 0.7),
        entry("governance", "iso-42001", "iso-4.1", 0.9),
        entry("governance", "iso-42001", "iso-6.1", 0.8),
        entry("governance", "iso-42001", "iso-7.2", 0.7),
        entry("governance", "iso-42001", "iso-8.1", 0.8),
        entry("governance", "gdpr", "art6", 0.6),
        // Accuracy.
        entry("accuracy", "eu-ai-act", "art15-1", 1.0),
        entry("accuracy", "eu-ai-act", "art13-3b", 0.9),
        entry("accuracy", "nist-ai-rmf", "mea-1", 1.0),
        entry("accuracy", "nist-ai-rmf", "mea-2", 0.8),
        entry("accuracy", "soc2", "pi1.1", 0.9),
        entry("accuracy", "iso-42001", "iso-9.1", 0.9),
    ]
}

// ── Analysis result types ──────────────────────────────────────────────

/// Coverage summary for one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkCoverage {
    /// Framework name.
    pub framework_name: String,
    /// Mean control score.
    pub average_score: f64,
    /// `average_score` as a percentage.
    pub coverage_percentage: f64,
    /// Controls assessed.
    pub controls_assessed: usize,
    /// Controls scoring below 0.5, sorted.
    pub high_risk_controls: Vec<String>,
}

/// A pillar contributing to a control gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingPillar {
    /// Pillar name.
    pub pillar: String,
    /// The pillar's current score.
    pub score: f64,
    /// The mapping weight (impact on the control).
    pub impact: f64,
}

/// One control below the compliance threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceGap {
    /// Control id.
    pub control_id: String,
    /// Control name.
    pub control_name: String,
    /// The control's current score.
    pub current_score: f64,
    /// The threshold it missed.
    pub threshold: f64,
    /// `threshold - current_score`.
    pub gap: f64,
    /// Below-threshold pillars mapped to this control.
    pub contributing_pillars: Vec<ContributingPillar>,
}

/// Remediation priority for a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPriority {
    /// Control score below 0.5.
    High,
    /// Control score between 0.5 and the threshold.
    Medium,
}

/// A remediation recommendation for one gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapRecommendation {
    /// Control id.
    pub control_id: String,
    /// Remediation priority.
    pub priority: GapPriority,
    /// The most impactful below-threshold pillar.
    pub focus_pillar: String,
    /// Expected score improvement per contributing pillar addressed.
    pub expected_improvement: f64,
}

/// Full gap analysis for one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapAnalysis {
    /// Framework id.
    pub framework_id: String,
    /// Framework name.
    pub framework_name: String,
    /// Controls declared by the framework.
    pub total_controls: usize,
    /// Controls below the threshold.
    pub gaps: Vec<ComplianceGap>,
    /// Per-gap remediation recommendations.
    pub recommendations: Vec<GapRecommendation>,
}

// ── ComplianceMapper ───────────────────────────────────────────────────

/// Maps pillar scores onto framework controls.
#[derive(Debug, Clone)]
pub struct ComplianceMapper {
    frameworks: FxHashMap<String, Framework>,
    relevance: Vec<RelevanceEntry>,
}

impl Default for ComplianceMapper {
    fn default() -> Self {
        Self {
            frameworks: builtin_frameworks()
                .into_iter()
                .map(|f| (f.id.clone(), f))
                .collect(),
            relevance: builtin_relevance(),
        }
    }
}

impl ComplianceMapper {
    /// Create a mapper with the built-in catalog and relevance table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a framework by id.
    #[must_use]
    pub fn get_framework(&self, framework_id: &str) -> Option<&Framework> {
        self.frameworks.get(framework_id)
    }

    /// Add a relevance tuple (e.g. for a custom pillar).
    pub fn add_relevance(&mut self, entry: RelevanceEntry) {
        self.relevance.push(entry);
    }

    /// Relevance tuples for a pillar, optionally filtered by framework.
    #[must_use]
    pub fn mappings_for_pillar(
        &self,
        pillar: &str,
        framework_id: Option<&str>,
    ) -> Vec<&RelevanceEntry> {
        self.relevance
            .iter()
            .filter(|e| e.pillar == pillar)
            .filter(|e| framework_id.is_none_or(|f| e.framework == f))
            .collect()
    }

    /// Relevance tuples targeting one control.
    #[must_use]
    pub fn mappings_for_control(
        &self,
        framework_id: &str,
        control_id: &str,
    ) -> Vec<&RelevanceEntry> {
        self.relevance
            .iter()
            .filter(|e| e.framework == framework_id && e.control == control_id)
            .collect()
    }

    /// Pillars a framework draws on, sorted.
    #[must_use]
    pub fn required_pillars(&self, framework_id: &str) -> Vec<String> {
        let mut pillars: Vec<String> = self
            .relevance
            .iter()
            .filter(|e| e.framework == framework_id)
            .map(|e| e.pillar.clone())
            .collect();
        pillars.sort();
        pillars.dedup();
        pillars
    }

    /// A control's score: the relevance-weighted average over pillars
    /// with known scores.  Zero when no mapped pillar has a score.
    #[must_use]
    pub fn control_score(
        &self,
        framework_id: &str,
        control_id: &str,
        pillar_scores: &BTreeMap<String, f64>,
    ) -> f64 {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for mapping in self.mappings_for_control(framework_id, control_id) {
            if let Some(score) = pillar_scores.get(&mapping.pillar) {
                weighted_sum += score * mapping.weight;
                total_weight += mapping.weight;
            }
        }

        if total_weight == 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        }
    }

    /// Per-framework coverage over the whole catalog.
    #[must_use]
    pub fn framework_coverage(
        &self,
        pillar_scores: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, FrameworkCoverage> {
        let mut coverage = BTreeMap::new();

        for framework in self.frameworks.values() {
            let mut control_scores: Vec<(String, f64)> = framework
                .controls
                .iter()
                .map(|c| {
                    (
                        c.id.clone(),
                        self.control_score(&framework.id, &c.id, pillar_scores),
                    )
                })
                .collect();
            control_scores.sort_by(|a, b| a.0.cmp(&b.0));

            let average = if control_scores.is_empty() {
                0.0
            } else {
                control_scores.iter().map(|(_, s)| s).sum::<f64>() / control_scores.len() as f64
            };

            coverage.insert(
                framework.id.clone(),
                FrameworkCoverage {
                    framework_name: framework.name.clone(),
                    average_score: average,
                    coverage_percentage: average * 100.0,
                    controls_assessed: control_scores.len(),
                    high_risk_controls: control_scores
                        .iter()
                        .filter(|(_, s)| *s < 0.5)
                        .map(|(id, _)| id.clone())
                        .collect(),
                },
            );
        }

        coverage
    }

    /// Gap analysis for one framework.
    ///
    /// Controls scoring below `threshold` (default 0.7 via
    /// [`gap_analysis_default`](Self::gap_analysis_default)) are
    /// reported with their below-threshold contributing pillars and a
    /// recommendation focused on the most impactful one.
    #[must_use]
    pub fn gap_analysis(
        &self,
        framework_id: &str,
        pillar_scores: &BTreeMap<String, f64>,
        threshold: f64,
    ) -> Option<GapAnalysis> {
        let framework = self.frameworks.get(framework_id)?;

        let mut gaps = Vec::new();
        let mut recommendations = Vec::new();

        for control in &framework.controls {
            let score = self.control_score(framework_id, &control.id, pillar_scores);
            if score >= threshold {
                continue;
            }

            let contributing: Vec<ContributingPillar> = self
                .mappings_for_control(framework_id, &control.id)
                .into_iter()
                .filter_map(|mapping| {
                    let pillar_score = pillar_scores.get(&mapping.pillar)?;
                    (*pillar_score < threshold).then(|| ContributingPillar {
                        pillar: mapping.pillar.clone(),
                        score: *pillar_score,
                        impact: mapping.weight,
                    })
                })
                .collect();

            if let Some(top) = contributing
                .iter()
                .max_by(|a, b| a.impact.total_cmp(&b.impact))
            {
                recommendations.push(GapRecommendation {
                    control_id: control.id.clone(),
                    priority: if score < 0.5 {
                        GapPriority::High
                    } else {
                        GapPriority::Medium
                    },
                    focus_pillar: top.pillar.clone(),
                    expected_improvement: (threshold - score) / contributing.len() as f64,
                });
            }

            gaps.push(ComplianceGap {
                control_id: control.id.clone(),
                control_name: control.name.clone(),
                current_score: score,
                threshold,
                gap: threshold - score,
                contributing_pillars: contributing,
            });
        }

        Some(GapAnalysis {
            framework_id: framework_id.to_string(),
            framework_name: framework.name.clone(),
            total_controls: framework.controls.len(),
            gaps,
            recommendations,
        })
    }

    /// Gap analysis with the default 0.7 threshold.
    #[must_use]
    pub fn gap_analysis_default(
        &self,
        framework_id: &str,
        pillar_scores: &BTreeMap<String, f64>,
    ) -> Option<GapAnalysis> {
        self.gap_analysis(framework_id, pillar_scores, 0.7)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
