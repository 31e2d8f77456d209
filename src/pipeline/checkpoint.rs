//! The [`Checkpoint`] trait — the unit of evaluation in the guardrails
//! pipeline — and the result type every checkpoint produces.
//!
//! A checkpoint receives the current content and a [`CheckContext`], and
//! returns a [`GuardrailReport`].  Checkpoints are composed into a
//! [`GuardrailsRuntime`](super::runtime::GuardrailsRuntime) which
//! orchestrates phase selection, per-checkpoint timeouts, fail policy,
//! and metrics.
//!
//! # Implementing a checkpoint
//!
//! ```rust,ignore
//! use modelwarden::pipeline::{Checkpoint, CheckContext, CheckpointError, GuardrailReport};
//!
//! struct LengthGate;
//!
//! #[async_trait::async_trait]
//! impl Checkpoint for LengthGate {
//!     fn name(&self) -> &str { "length_gate" }
//!
//!     async fn check(
//!         &self,
//!         content: &str,
//!         _ctx: &CheckContext,
//!     ) -> Result<GuardrailReport, CheckpointError> {
//!         if content.len() > 100_000 {
//!             return Ok(GuardrailReport::block(
//!                 "length_gate",
//!                 content,
//!                 vec!["content exceeds 100 KB".into()],
//!             ));
//!         }
//!         Ok(GuardrailReport::allow("length_gate", content))
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::verdict::Verdict;

/// A JSON metadata bag attached to contexts and reports.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ── Position ───────────────────────────────────────────────────────────

/// Which phase(s) of the pipeline a checkpoint participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Runs before the model is invoked.
    Input,
    /// Runs over the model's response.
    Output,
    /// Runs in both phases.
    Both,
}

impl Position {
    /// Whether a checkpoint at this position runs in the input phase.
    #[must_use]
    pub fn covers_input(self) -> bool {
        matches!(self, Self::Input | Self::Both)
    }

    /// Whether a checkpoint at this position runs in the output phase.
    #[must_use]
    pub fn covers_output(self) -> bool {
        matches!(self, Self::Output | Self::Both)
    }
}

// ── CheckContext ───────────────────────────────────────────────────────

/// Contextual information passed to every checkpoint.
///
/// Carries session identity and an arbitrary metadata bag.  The context
/// is immutable from a checkpoint's perspective — checkpoints communicate
/// downstream through their [`GuardrailReport`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckContext {
    session_id: Option<String>,
    user_id: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

impl CheckContext {
    /// Start building a context.
    #[must_use]
    pub fn builder() -> CheckContextBuilder {
        CheckContextBuilder::default()
    }

    /// The session identifier, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The user identifier, if authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The metadata bag attached to this request.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Resolve a dotted path (e.g. `"user.role"`) into the metadata bag.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.metadata.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// Builder for [`CheckContext`].
#[derive(Debug, Default)]
pub struct CheckContextBuilder {
    session_id: Option<String>,
    user_id: Option<String>,
    metadata: Metadata,
}

impl CheckContextBuilder {
    /// Set the session identifier.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set the user identifier.
    #[must_use]
    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Build the context.
    #[must_use]
    pub fn build(self) -> CheckContext {
        CheckContext {
            session_id: self.session_id,
            user_id: self.user_id,
            metadata: self.metadata,
        }
    }
}

// ── GuardrailReport ────────────────────────────────────────────────────

/// The result of a single checkpoint (or a full pipeline phase).
///
/// Construction enforces the verdict invariants: a `Modify` report always
/// carries changed content, a `Block` report never passes, and an `Allow`
/// report never carries modified content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailReport {
    /// The action decided by the checkpoint.
    pub action: Verdict,
    /// Whether the content may proceed.
    pub passed: bool,
    /// The content as received.
    pub original_content: String,
    /// The transformed content, present only for `Modify`.
    pub modified_content: Option<String>,
    /// Name of the checkpoint (or `"pipeline"` for phase-level reports).
    pub guardrail_name: String,
    /// Confidence in the verdict (0.0–1.0).
    pub confidence: f64,
    /// Human-readable reasons accumulated during the check.
    pub reasons: Vec<String>,
    /// Structured metadata accumulated during the check.
    #[serde(default)]
    pub metadata: Metadata,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: f64,
    /// When the report was produced (UTC).
    pub timestamp: DateTime<Utc>,
}

impl GuardrailReport {
    fn base(action: Verdict, passed: bool, name: &str, content: &str) -> Self {
        Self {
            action,
            passed,
            original_content: content.to_string(),
            modified_content: None,
            guardrail_name: name.to_string(),
            confidence: 1.0,
            reasons: Vec::new(),
            metadata: Metadata::new(),
            processing_time_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// An allow report — content proceeds unchanged.
    #[must_use]
    pub fn allow(name: &str, content: &str) -> Self {
        Self::base(Verdict::Allow, true, name, content)
    }

    /// A block report — the content must not proceed.
    #[must_use]
    pub fn block(name: &str, content: &str, reasons: Vec<String>) -> Self {
        let mut report = Self::base(Verdict::Block, false, name, content);
        report.reasons = reasons;
        report
    }

    /// A modify report.  If `modified` equals the original the report
    /// degrades to `Allow`, preserving the modify invariant.
    #[must_use]
    pub fn modify(name: &str, content: &str, modified: String, reasons: Vec<String>) -> Self {
        if modified == content {
            let mut report = Self::base(Verdict::Allow, true, name, content);
            report.reasons = reasons;
            return report;
        }
        let mut report = Self::base(Verdict::Modify, true, name, content);
        report.modified_content = Some(modified);
        report.reasons = reasons;
        report
    }

    /// A warn report — content proceeds, caller is warned.
    #[must_use]
    pub fn warn(name: &str, content: &str, reasons: Vec<String>) -> Self {
        let mut report = Self::base(Verdict::Warn, true, name, content);
        report.reasons = reasons;
        report
    }

    /// A report with an arbitrary non-modifying verdict (`Log`, `Audit`,
    /// `Review`).
    #[must_use]
    pub fn with_verdict(action: Verdict, name: &str, content: &str, reasons: Vec<String>) -> Self {
        let mut report = Self::base(action, !action.is_blocking(), name, content);
        report.reasons = reasons;
        report
    }

    /// Attach a confidence value.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The content that should flow to the next stage: the modified
    /// content when present, otherwise the original.
    #[must_use]
    pub fn effective_content(&self) -> &str {
        self.modified_content
            .as_deref()
            .unwrap_or(&self.original_content)
    }
}

// ── CheckpointError ────────────────────────────────────────────────────

/// An error encountered while a checkpoint evaluates content.
///
/// Distinct from a "threat detected" block — it means the checkpoint
/// *could not complete its analysis*.  The runtime consults the
/// checkpoint's [`fail_open`](Checkpoint::fail_open) policy to decide
/// between pass-through and block.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The checkpoint's backing service or model is unavailable.
    #[error("backend unavailable for checkpoint '{checkpoint}': {reason}")]
    BackendUnavailable {
        /// Checkpoint identifier.
        checkpoint: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The content could not be processed (format mismatch, too large).
    #[error("invalid content for checkpoint '{checkpoint}': {reason}")]
    InvalidContent {
        /// Checkpoint identifier.
        checkpoint: String,
        /// What went wrong.
        reason: String,
    },

    /// Catch-all for unexpected failures.
    #[error("internal error in checkpoint '{checkpoint}': {source}")]
    Internal {
        /// Checkpoint identifier.
        checkpoint: String,
        /// Underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

// ── Checkpoint trait ───────────────────────────────────────────────────

/// One stage of the guardrails pipeline.
///
/// Implementations are expected to be cheap to share (internally
/// `Arc`-wrapped where needed) and safe across Tokio tasks.
///
/// # Contract
///
/// - [`check`](Self::check) must not mutate internal state between calls.
/// - If the checkpoint cannot complete its analysis, return
///   `Err(CheckpointError)`; the runtime applies the fail-open policy.
/// - The runtime enforces [`timeout`](Self::timeout) per invocation —
///   checkpoints need not time themselves.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    /// Unique name for this checkpoint (metrics label, audit key).
    fn name(&self) -> &str;

    /// Which phase(s) this checkpoint runs in.  Defaults to both.
    fn position(&self) -> Position {
        Position::Both
    }

    /// Whether this checkpoint is active.  Disabled checkpoints are
    /// skipped without metrics.
    fn enabled(&self) -> bool {
        true
    }

    /// On timeout or error, behave as if the check passed.
    ///
    /// Defaults to `false` (fail closed).  The runtime-wide flag must
    /// also be set for a failure to pass through.
    fn fail_open(&self) -> bool {
        false
    }

    /// Per-invocation timeout budget.
    fn timeout(&self) -> Duration {
        Duration::from_millis(5_000)
    }

    /// Evaluate the content.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the evaluation cannot complete.
    async fn check(
        &self,
        content: &str,
        ctx: &CheckContext,
    ) -> Result<GuardrailReport, CheckpointError>;
}

// ── FnCheckpoint ───────────────────────────────────────────────────────

type CheckFn = Arc<
    dyn Fn(String, CheckContext) -> BoxFuture<'static, Result<GuardrailReport, CheckpointError>>
        + Send
        + Sync,
>;

/// A checkpoint backed by a closure, for ad-hoc checks and tests.
#[derive(Clone)]
pub struct FnCheckpoint {
    name: String,
    position: Position,
    enabled: bool,
    fail_open: bool,
    timeout: Duration,
    func: CheckFn,
}

impl std::fmt::Debug for FnCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCheckpoint")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("enabled", &self.enabled)
            .field("fail_open", &self.fail_open)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl FnCheckpoint {
    /// Wrap an async closure as a checkpoint.
    pub fn new<F, Fut>(name: impl Into<String>, position: Position, func: F) -> Self
    where
        F: Fn(String, CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailReport, CheckpointError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            position,
            enabled: true,
            fail_open: false,
            timeout: Duration::from_millis(5_000),
            func: Arc::new(move |content, ctx| {
                let fut: BoxFuture<'static, Result<GuardrailReport, CheckpointError>> =
                    Box::pin(func(content, ctx));
                fut
            }),
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

    /// Enable or disable the checkpoint.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[async_trait]
impl Checkpoint for FnCheckpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Position {
        self.position
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn fail_open(&self) -> bool {
        self.fail_open
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(
        &self,
        content: &str,
        ctx: &CheckContext,
    ) -> Result<GuardrailReport, CheckpointError> {
        (self.func)(content.to_string(), ctx.clone()).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
