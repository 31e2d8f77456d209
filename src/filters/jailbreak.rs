//! Jailbreak and prompt-injection heuristics.
//!
//! A fixed pattern set compiled into a [`RegexSet`] for single-pass
//! multi-pattern matching.  Covers DAN-style personas, instruction
//! override, role-play exploits, system-prompt extraction, safety
//! bypass, encoding tricks, and delimiter injections.

use async_trait::async_trait;
use regex::{RegexSet, RegexSetBuilder};

use crate::pipeline::checkpoint::{CheckContext, CheckpointError, Position};
use crate::verdict::Verdict;

use super::filter::{ContentFilter, Detection, FilterProfile};

/// The built-in jailbreak pattern set.
const JAILBREAK_PATTERNS: &[&str] = &[
    // DAN (Do Anything Now)
    r"\bDAN\b.*mode",
    r"do\s+anything\s+now",
    // Ignore instructions
    r"ignore\s+(all\s+)?(previous|prior|above)\s+(instructions|prompts)",
    r"disregard\s+(all\s+)?(previous|prior|above)",
    // Role play exploits
    r"pretend\s+(you\s+)?(are|have|can|were)",
    r"act\s+as\s+if\s+(you\s+)?(have|are|can|were)",
    r"imagine\s+(you\s+)?(are|have|can|were)",
    // System prompt extraction
    r"(show|reveal|tell|print|display)\s+(me\s+)?(your|the)\s+(system\s+)?(prompt|instructions)",
    r"what\s+(is|are)\s+(your|the)\s+(system\s+)?(prompt|instructions)",
    // Bypass attempts
    r"bypass\s+(your|the|any)\s+(safety|security|restrictions)",
    r"disable\s+(your|the|any)\s+(safety|security|filters)",
    r"turn\s+off\s+(your|the|any)\s+(safety|security)",
    // Encoding exploits
    r"base64\s*[:=]",
    r"decode\s+this",
    r"rot13",
    // Delimiter injections
    r"\[INST\]",
    r"###\s*system",
];

/// Detects jailbreak attempts against a fixed pattern set.
#[derive(Debug, Clone)]
pub struct JailbreakFilter {
    profile: FilterProfile,
    patterns: RegexSet,
}

impl JailbreakFilter {
    /// Build a filter from the built-in set plus optional extra
    /// patterns.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::InvalidContent`] if an extra pattern
    /// fails to compile.
    pub fn new(custom_patterns: &[String]) -> Result<Self, CheckpointError> {
        let all: Vec<&str> = JAILBREAK_PATTERNS
            .iter()
            .copied()
            .chain(custom_patterns.iter().map(String::as_str))
            .collect();

        let patterns = RegexSetBuilder::new(&all)
            .case_insensitive(true)
            .build()
            .map_err(|e| CheckpointError::InvalidContent {
                checkpoint: "jailbreak_filter".into(),
                reason: format!("failed to compile pattern set: {e}"),
            })?;

        Ok(Self {
            profile: FilterProfile::new("jailbreak_filter", Position::Input, Verdict::Block),
            patterns,
        })
    }

    /// Build a filter with the built-in pattern set only.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the built-in set fails to compile.
    pub fn with_defaults() -> Result<Self, CheckpointError> {
        Self::new(&[])
    }

    /// Override the on-match verdict (defaults to block).
    #[must_use]
    pub fn on_match(mut self, verdict: Verdict) -> Self {
        self.profile.on_match = verdict;
        self
    }
}

#[async_trait]
impl ContentFilter for JailbreakFilter {
    fn profile(&self) -> &FilterProfile {
        &self.profile
    }

    async fn detect(
        &self,
        content: &str,
        _ctx: &CheckContext,
    ) -> Result<Detection, CheckpointError> {
        let matched: Vec<usize> = self.patterns.matches(content).into_iter().collect();

        if matched.is_empty() {
            return Ok(Detection::none());
        }

        Ok(Detection::matched(vec![format!(
            "potential jailbreak attempt detected ({} patterns)",
            matched.len(),
        )])
        .with_metadata("pattern_indices", serde_json::json!(matched)))
    }
}

crate::impl_filter_checkpoint!(JailbreakFilter);

// ── Tests ──────────────────────────────────────────────────────────────
