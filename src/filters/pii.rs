//! PII detection and length-preserving redaction.
//!
//! [`PiiFilter`] scans content against a regex family covering common
//! personally identifiable information.  When configured with a
//! [`Verdict::Modify`] on-match action, every matched span is replaced
//! by the redaction character repeated once per character, so the
//! modified content always has the same length as the original.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::pipeline::checkpoint::{CheckContext, CheckpointError, Position};
use crate::verdict::Verdict;

use super::filter::{ContentFilter, Detection, FilterProfile};

// ── Pattern table ──────────────────────────────────────────────────────

/// One entry of the PII regex family.
#[derive(Debug, Clone)]
struct PiiPattern {
    kind: String,
    description: String,
    regex: Regex,
}

/// SSN prefixes that are never issued; matches starting with one of
/// these discount detection confidence by half.
const SSN_INVALID_PREFIXES: [&str; 2] = ["000", "666"];

fn builtin_patterns() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b", "Social Security Number"),
        (
            "credit_card",
            r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
            "Credit Card Number",
        ),
        (
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            "Email Address",
        ),
        (
            "phone_us",
            r"\b(?:\+1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            "US Phone Number",
        ),
        ("ip_address", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "IP Address"),
        (
            "date_of_birth",
            r"\b(?:0[1-9]|1[0-2])[/\-](?:0[1-9]|[12]\d|3[01])[/\-](?:19|20)\d{2}\b",
            "Date of Birth",
        ),
        ("passport", r"\b[A-Z]{1,2}\d{6,9}\b", "Passport Number"),
        (
            "drivers_license",
            r"\b[A-Z]{1,2}\d{5,8}\b",
            "Driver's License",
        ),
    ]
}

// ── PiiConfig ──────────────────────────────────────────────────────────

/// Configuration for [`PiiFilter`].
#[derive(Debug, Clone)]
pub struct PiiConfig {
    /// Subset of built-in kinds to detect (`None` = all).
    pub pii_types: Option<Vec<String>>,
    /// Additional `(kind, pattern, description)` entries.
    pub custom_patterns: Vec<(String, String, String)>,
    /// Character used for redaction when the on-match action is modify.
    pub redaction_char: char,
    /// Verdict applied on a match (defaults to modify).
    pub on_match: Verdict,
    /// Which phase(s) the filter runs in.
    pub position: Position,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            pii_types: None,
            custom_patterns: Vec::new(),
            redaction_char: '*',
            on_match: Verdict::Modify,
            position: Position::Both,
        }
    }
}

impl PiiConfig {
    /// Create a configuration with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict detection to the given built-in kinds.
    #[must_use]
    pub fn pii_types(mut self, types: Vec<String>) -> Self {
        self.pii_types = Some(types);
        self
    }

    /// Add a custom `(kind, pattern, description)` entry.
    #[must_use]
    pub fn custom_pattern(
        mut self,
        kind: impl Into<String>,
        pattern: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.custom_patterns
            .push((kind.into(), pattern.into(), description.into()));
        self
    }

    /// Set the redaction character.
    #[must_use]
    pub fn redaction_char(mut self, ch: char) -> Self {
        self.redaction_char = ch;
        self
    }

    /// Set the on-match verdict.
    #[must_use]
    pub fn on_match(mut self, verdict: Verdict) -> Self {
        self.on_match = verdict;
        self
    }

    /// Set the pipeline position.
    #[must_use]
    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

// ── PiiFilter ──────────────────────────────────────────────────────────

/// Detects and optionally redacts personally identifiable information.
#[derive(Debug, Clone)]
pub struct PiiFilter {
    profile: FilterProfile,
    patterns: Vec<PiiPattern>,
    redaction_char: char,
}

impl PiiFilter {
    /// Build a filter from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::InvalidContent`] if a custom pattern
    /// fails to compile.
    pub fn new(config: PiiConfig) -> Result<Self, CheckpointError> {
        let selected: Vec<(String, String, String)> = builtin_patterns()
            .into_iter()
            .filter(|(kind, _, _)| {
                config
                    .pii_types
                    .as_ref()
                    .is_none_or(|types| types.iter().any(|t| t == kind))
            })
            .map(|(k, p, d)| (k.to_string(), p.to_string(), d.to_string()))
            .chain(config.custom_patterns.iter().cloned())
            .collect();

        let mut patterns = Vec::with_capacity(selected.len());
        for (kind, pattern, description) in selected {
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| CheckpointError::InvalidContent {
                    checkpoint: "pii_filter".into(),
                    reason: format!("pattern '{kind}' failed to compile: {e}"),
                })?;
            patterns.push(PiiPattern {
                kind,
                description,
                regex,
            });
        }

        Ok(Self {
            profile: FilterProfile::new("pii_filter", config.position, config.on_match),
            patterns,
            redaction_char: config.redaction_char,
        })
    }

    /// Build a filter detecting all built-in kinds with `*` redaction.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if a built-in pattern fails to
    /// compile.
    pub fn with_defaults() -> Result<Self, CheckpointError> {
        Self::new(PiiConfig::default())
    }

    fn redact(&self, content: &str) -> String {
        let mut redacted = content.to_string();
        for pattern in &self.patterns {
            redacted = pattern
                .regex
                .replace_all(&redacted, |caps: &regex::Captures<'_>| {
                    let len = caps[0].chars().count();
                    self.redaction_char.to_string().repeat(len)
                })
                .into_owned();
        }
        redacted
    }
}

#[async_trait]
impl ContentFilter for PiiFilter {
    fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    async fn detect(
        &self,
        content: &str,
        _ctx: &CheckContext,
    ) -> Result<Detection, CheckpointError> {
        let mut detections = serde_json::Map::new();
        let mut reasons = Vec::new();
        let mut confidence = 1.0;

        for pattern in &self.patterns {
            let matches: Vec<&str> = pattern
                .regex
                .find_iter(content)
                .map(|m| m.as_str())
                .collect();
            if matches.is_empty() {
                continue;
            }

            if pattern.kind == "ssn"
                && matches.iter().any(|m| {
                    SSN_INVALID_PREFIXES.iter().any(|p| m.starts_with(p)) || m.starts_with('9')
                })
            {
                confidence *= 0.5;
            }

            detections.insert(
                pattern.kind.clone(),
                serde_json::json!({
                    "count": matches.len(),
                    "description": pattern.description,
                }),
            );
            reasons.push(format!("Found {} {}", matches.len(), pattern.description));
        }

        if detections.is_empty() {
            return Ok(Detection::none());
        }

        Ok(Detection::matched(reasons)
            .with_metadata("pii_detections", serde_json::Value::Object(detections))
            .with_confidence(confidence))
    }

    fn transform(&self, content: &str) -> Option<String> {
        let redacted = self.redact(content);
        (redacted != content).then_some(redacted)
    }
}

crate::impl_filter_checkpoint!(PiiFilter);

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::checkpoint::Checkpoint;

    fn ctx() -> CheckContext {
        CheckContext::default()
    }

    #[tokio::test]
    async fn detects_email_and_redacts_with_equal_length() {
        let filter = PiiFilter::with_defaults().unwrap();
        let content = "email me at john.doe@example.com";

        let report = filter.check(content, &ctx()).await.unwrap();
        assert_eq!(report.action, Verdict::Modify);
        assert!(report.passed);

        let modified = report.modified_content.unwrap();
        assert_eq!(modified.chars().count(), content.chars().count());
        assert!(!modified.contains("john.doe@example.com"));
        assert!(modified.contains("email me at "));
        assert_eq!(&modified[12..], "*".repeat(20));
    }

    #[tokio::test]
    async fn detects_ssn() {
        let filter = PiiFilter::with_defaults().unwrap();
        let detection = filter
            .detect("my ssn is 123-45-6789", &ctx())
            .await
            .unwrap();
        assert!(detection.matched);
        assert!(detection.reasons.iter().any(|r| r.contains("Social Security")));
        assert!((detection.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn invalid_ssn_prefix_discounts_confidence() {
        let filter = PiiFilter::with_defaults().unwrap();

        for sample in ["000-12-3456", "666-12-3456", "912-34-5678"] {
            let detection = filter
                .detect(&format!("ssn: {sample}"), &ctx())
                .await
                .unwrap();
            assert!(detection.matched);
            assert!(
                (detection.confidence - 0.5).abs() < f64::EPSILON,
                "prefix of {sample} must halve confidence",
            );
        }
    }

    #[tokio::test]
    async fn clean_content_allows() {
        let filter = PiiFilter::with_defaults().unwrap();
        let report = filter
            .check("nothing sensitive here", &ctx())
            .await
            .unwrap();
        assert_eq!(report.action, Verdict::Allow);
        assert!(report.modified_content.is_none());
    }

    #[tokio::test]
    async fn block_mode_blocks_without_modifying() {
        let filter = PiiFilter::new(PiiConfig::new().on_match(Verdict::Block)).unwrap();
        let report = filter
            .check("card 4111-1111-1111-1111", &ctx())
            .await
            .unwrap();
        assert_eq!(report.action, Verdict::Block);
        assert!(!report.passed);
        assert!(report.modified_content.is_none());
    }

    #[tokio::test]
    async fn type_subset_limits_detection() {
        let filter =
            PiiFilter::new(PiiConfig::new().pii_types(vec!["email".to_string()])).unwrap();
        let detection = filter
            .detect("ssn 123-45-6789 but no mail", &ctx())
            .await
            .unwrap();
        assert!(!detection.matched);
    }

    #[tokio::test]
    async fn custom_pattern_participates() {
        let filter = PiiFilter::new(PiiConfig::new().custom_pattern(
            "employee_id",
            r"\bEMP-\d{5}\b",
            "Employee ID",
        ))
        .unwrap();
        let detection = filter.detect("badge EMP-12345", &ctx()).await.unwrap();
        assert!(detection.matched);
        assert!(detection.reasons.iter().any(|r| r.contains("Employee ID")));
    }

    #[tokio::test]
    async fn multiple_kinds_all_reported() {
        let filter = PiiFilter::with_defaults().unwrap();
        let detection = filter
            .detect(
                "reach me at jane@corp.io or 555-867-5309, server at 10.0.0.1",
                &ctx(),
            )
            .await
            .unwrap();
        assert!(detection.matched);
        let kinds = detection.metadata["pii_detections"].as_object().unwrap();
        assert!(kinds.contains_key("email"));
        assert!(kinds.contains_key("phone_us"));
        assert!(kinds.contains_key("ip_address"));
    }
}
