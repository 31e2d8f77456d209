//! The [`ContentFilter`] trait and its adapter onto the checkpoint
//! pipeline.
//!
//! A filter separates *detection* from *policy*: `detect` reports whether
//! the content matches the filter's criteria, and the
//! [`FilterProfile::on_match`] verdict decides what a match means.  The
//! [`impl_filter_checkpoint!`](crate::impl_filter_checkpoint) macro turns
//! any filter into a pipeline [`Checkpoint`].
//!
//! [`Checkpoint`]: crate::pipeline::Checkpoint

use async_trait::async_trait;
use std::time::Duration;

use crate::pipeline::checkpoint::{CheckContext, CheckpointError, GuardrailReport, Metadata, Position};
use crate::verdict::Verdict;

// ── FilterProfile ──────────────────────────────────────────────────────

/// The checkpoint-facing configuration shared by every filter.
#[derive(Debug, Clone)]
pub struct FilterProfile {
    /// Unique filter name (metrics label, report name).
    pub name: String,
    /// Which phase(s) the filter runs in.
    pub position: Position,
    /// Whether the filter is active.
    pub enabled: bool,
    /// On timeout or error, behave as if the check passed.
    pub fail_open: bool,
    /// Per-invocation timeout budget.
    pub timeout: Duration,
    /// Verdict applied when the detection fires.
    pub on_match: Verdict,
}

impl FilterProfile {
    /// Create a profile with the crate-wide defaults (enabled, fail
    /// closed, 5 s budget).
    #[must_use]
    pub fn new(name: impl Into<String>, position: Position, on_match: Verdict) -> Self {
        Self {
            name: name.into(),
            position,
            enabled: true,
            fail_open: false,
            timeout: Duration::from_millis(5_000),
            on_match,
        }
    }

    /// Set the fail-open policy.
    #[must_use]
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Set the timeout budget.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the filter.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ── Detection ──────────────────────────────────────────────────────────

/// Outcome of a filter's detection step.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Whether the filter's criteria matched.
    pub matched: bool,
    /// Human-readable reasons for the match.
    pub reasons: Vec<String>,
    /// Structured details about the match.
    pub metadata: Metadata,
    /// Confidence in the detection (0.0–1.0).
    pub confidence: f64,
}

impl Detection {
    /// No match.
    #[must_use]
    pub fn none() -> Self {
        Self {
            matched: false,
            reasons: Vec::new(),
            metadata: Metadata::new(),
            confidence: 1.0,
        }
    }

    /// A match with the given reasons.
    #[must_use]
    pub fn matched(reasons: Vec<String>) -> Self {
        Self {
            matched: true,
            reasons,
            metadata: Metadata::new(),
            confidence: 1.0,
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a confidence value.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

// ── ContentFilter trait ────────────────────────────────────────────────

/// A named content check with a configurable on-match verdict.
///
/// Implementors provide [`detect`](Self::detect); filters whose on-match
/// verdict is [`Verdict::Modify`] additionally provide
/// [`transform`](Self::transform) to produce the replacement content.
#[async_trait]
pub trait ContentFilter: Send + Sync {
    /// The filter's checkpoint-facing configuration.
    fn profile(&self) -> &FilterProfile;

    /// Inspect the content.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the inspection cannot complete
    /// (e.g. a remote scoring backend is unavailable).
    async fn detect(
        &self,
        content: &str,
        ctx: &CheckContext,
    ) -> Result<Detection, CheckpointError>;

    /// Produce the transformed content for a `Modify` match.
    ///
    /// Defaults to `None`; a modify-configured filter without a
    /// transform degrades to a warning.
    fn transform(&self, _content: &str) -> Option<String> {
        None
    }
}

/// Map a filter's detection onto a [`GuardrailReport`] according to its
/// on-match verdict.  Shared by every generated checkpoint adapter.
///
/// # Errors
///
/// Propagates any [`CheckpointError`] from the detection step.
pub async fn evaluate<F>(
    filter: &F,
    content: &str,
    ctx: &CheckContext,
) -> Result<GuardrailReport, CheckpointError>
where
    F: ContentFilter + ?Sized,
{
    let detection = filter.detect(content, ctx).await?;
    let profile = filter.profile();

    if !detection.matched {
        return Ok(GuardrailReport::allow(&profile.name, content));
    }

    let Detection {
        reasons,
        metadata,
        confidence,
        ..
    } = detection;

    if profile.on_match == Verdict::Modify {
        if let Some(modified) = filter.transform(content) {
            let mut report = GuardrailReport::modify(&profile.name, content, modified, reasons);
            report.metadata = metadata;
            report.confidence = confidence;
            return Ok(report);
        }
        // A modify filter that cannot transform degrades to a warning.
        let mut report = GuardrailReport::warn(&profile.name, content, reasons);
        report.metadata = metadata;
        report.confidence = confidence;
        return Ok(report);
    }

    let mut report =
        GuardrailReport::with_verdict(profile.on_match, &profile.name, content, reasons);
    report.metadata = metadata;
    report.confidence = confidence;
    Ok(report)
}

/// Generate the [`Checkpoint`](crate::pipeline::Checkpoint)
/// implementation for a [`ContentFilter`] type.
#[macro_export]
macro_rules! impl_filter_checkpoint {
    ($ty:ty) => {
        #[async_trait::async_trait]
        impl $crate::pipeline::checkpoint::Checkpoint for $ty {
            fn name(&self) -> &str {
                &$crate::filters::filter::ContentFilter::profile(self).name
            }

            fn position(&self) -> $crate::pipeline::checkpoint::Position {
                $crate::filters::filter::ContentFilter::profile(self).position
            }

            fn enabled(&self) -> bool {
                $crate::filters::filter::ContentFilter::profile(self).enabled
            }

            fn fail_open(&self) -> bool {
                $crate::filters::filter::ContentFilter::profile(self).fail_open
            }

            fn timeout(&self) -> ::std::time::Duration {
                $crate::filters::filter::ContentFilter::profile(self).timeout
            }

            async fn check(
                &self,
                content: &str,
                ctx: &$crate::pipeline::checkpoint::CheckContext,
            ) -> ::std::result::Result<
                $crate::pipeline::checkpoint::GuardrailReport,
                $crate::pipeline::checkpoint::CheckpointError,
            > {
                $crate::filters::filter::evaluate(self, content, ctx).await
            }
        }
    };
}

// ── Tests ──────────────────────────────────────────────────────────────
