//! The [`GuardrailsRuntime`] — sequential two-phase checkpoint execution
//! around model inference.
//!
//! # Execution model
//!
//! 1. Checkpoints run in registration order for the requested phase.
//! 2. Each invocation is bounded by the checkpoint's own timeout budget;
//!    the pipeline enforces it per step, not cumulatively.
//! 3. A `Block` verdict short-circuits the remaining checkpoints.
//! 4. A `Modify` verdict replaces the working content; later checkpoints
//!    see the modified content.
//! 5. A timeout or checkpoint failure is resolved by the fail-open
//!    policy: pass-through (with an explanatory reason) when either the
//!    checkpoint or the runtime is fail-open, block otherwise.
//!
//! The runtime never lets an error escape to the caller — every path
//! produces a [`GuardrailReport`].
//!
//! # Example
//!
//! ```rust,ignore
//! let runtime = GuardrailsRuntime::builder()
//!     .add_checkpoint(JailbreakFilter::default())
//!     .add_checkpoint(PiiFilter::default())
//!     .build();
//!
//! let report = runtime.check_input("hello", &CheckContext::default()).await;
//! assert!(report.passed);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::verdict::Verdict;

use super::checkpoint::{CheckContext, Checkpoint, GuardrailReport, Metadata};
use super::metrics::PipelineMetrics;

/// Name used for phase-level reports assembled by the runtime.
const PIPELINE_NAME: &str = "pipeline";

// ── Phase ──────────────────────────────────────────────────────────────

/// Which half of the input/output sandwich a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the model is invoked.
    Input,
    /// Over the model's response.
    Output,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

// ── ExchangeReport ─────────────────────────────────────────────────────

/// Result of the full input → model → output sandwich.
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    /// Report from the input phase.
    pub input_report: GuardrailReport,
    /// Report from the output phase, absent when input blocked or the
    /// model call failed.
    pub output_report: Option<GuardrailReport>,
    /// The deliverable content: the (possibly modified) model output, or
    /// `None` when either phase blocked or the model call failed.
    pub final_content: Option<String>,
    /// The phase that blocked, if any.
    pub blocked_at: Option<Phase>,
    /// Error string from the model invocation, if it failed.
    pub model_error: Option<String>,
}

impl ExchangeReport {
    /// Convenience: true when content survived both phases.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.final_content.is_some()
    }
}

// ── GuardrailsRuntime ──────────────────────────────────────────────────

/// Sequential two-phase guardrails runtime.
///
/// Checkpoints and the fail-open flag are fixed at construction; to
/// change the configuration, build a new runtime and swap the shared
/// pointer — in-flight requests keep the snapshot they started with.
pub struct GuardrailsRuntime {
    input_checkpoints: Vec<Arc<dyn Checkpoint>>,
    output_checkpoints: Vec<Arc<dyn Checkpoint>>,
    fail_open: bool,
    metrics: PipelineMetrics,
}

impl GuardrailsRuntime {
    /// Start building a runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Run the input-phase checkpoints over `content`.
    pub async fn check_input(&self, content: &str, ctx: &CheckContext) -> GuardrailReport {
        self.run_phase(content, &self.input_checkpoints, ctx, Phase::Input)
            .await
    }

    /// Run the output-phase checkpoints over `content`.
    pub async fn check_output(&self, content: &str, ctx: &CheckContext) -> GuardrailReport {
        self.run_phase(content, &self.output_checkpoints, ctx, Phase::Output)
            .await
    }

    /// Run both phases around a deferred model invocation.
    ///
    /// The input phase runs first; on block, the model is never invoked.
    /// Otherwise `model_fn` receives the (possibly modified) input.  The
    /// model call is passed through with no extra timeout wrapping — the
    /// supplied function must self-regulate.  A model failure is carried
    /// in [`ExchangeReport::model_error`]; it is never raised.
    pub async fn check_both<F, Fut>(
        &self,
        input: &str,
        model_fn: F,
        ctx: &CheckContext,
    ) -> ExchangeReport
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<
            Output = Result<String, Box<dyn std::error::Error + Send + Sync>>,
        >,
    {
        let input_report = self.check_input(input, ctx).await;

        if !input_report.passed {
            return ExchangeReport {
                input_report,
                output_report: None,
                final_content: None,
                blocked_at: Some(Phase::Input),
                model_error: None,
            };
        }

        let processed_input = input_report.effective_content().to_string();

        let model_output = match model_fn(processed_input.clone()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "model inference failed");
                return ExchangeReport {
                    input_report,
                    output_report: None,
                    final_content: None,
                    blocked_at: None,
                    model_error: Some(e.to_string()),
                };
            }
        };

        // The output phase sees both the original and processed input.
        let mut builder = CheckContext::builder();
        if let Some(sid) = ctx.session_id() {
            builder = builder.session_id(sid);
        }
        if let Some(uid) = ctx.user_id() {
            builder = builder.user_id(uid);
        }
        for (key, value) in ctx.metadata() {
            builder = builder.metadata(key.clone(), value.clone());
        }
        let output_ctx = builder
            .metadata("original_input", serde_json::Value::String(input.to_string()))
            .metadata(
                "processed_input",
                serde_json::Value::String(processed_input),
            )
            .build();

        let output_report = self.check_output(&model_output, &output_ctx).await;

        let blocked_at = (!output_report.passed).then_some(Phase::Output);
        let final_content = output_report
            .passed
            .then(|| output_report.effective_content().to_string());

        ExchangeReport {
            input_report,
            output_report: Some(output_report),
            final_content,
            blocked_at,
            model_error: None,
        }
    }

    async fn run_phase(
        &self,
        content: &str,
        checkpoints: &[Arc<dyn Checkpoint>],
        ctx: &CheckContext,
        phase: Phase,
    ) -> GuardrailReport {
        let start = Instant::now();
        let mut current_content = content.to_string();
        let mut all_reasons: Vec<String> = Vec::new();
        let mut all_metadata = Metadata::new();

        self.metrics.record_run_started();

        for checkpoint in checkpoints {
            if !checkpoint.enabled() {
                continue;
            }

            let cp_start = Instant::now();
            let outcome =
                tokio::time::timeout(checkpoint.timeout(), checkpoint.check(&current_content, ctx))
                    .await;
            let cp_latency = cp_start.elapsed().as_secs_f64() * 1_000.0;

            match outcome {
                Ok(Ok(report)) => {
                    self.metrics
                        .record_checkpoint(checkpoint.name(), &report, cp_latency);

                    match report.action {
                        Verdict::Block => {
                            self.metrics.record_blocked();
                            tracing::warn!(
                                checkpoint = checkpoint.name(),
                                %phase,
                                reasons = ?report.reasons,
                                "guardrail blocked content",
                            );
                            let mut blocked = report;
                            blocked.original_content = content.to_string();
                            blocked.processing_time_ms =
                                start.elapsed().as_secs_f64() * 1_000.0;
                            return blocked;
                        }
                        Verdict::Modify => {
                            self.metrics.record_modified();
                            if let Some(modified) = &report.modified_content {
                                current_content = modified.clone();
                            }
                            all_reasons.extend(report.reasons.iter().cloned());
                            all_metadata.insert(
                                checkpoint.name().to_string(),
                                serde_json::Value::Object(report.metadata.clone()),
                            );
                        }
                        Verdict::Warn => {
                            tracing::warn!(
                                checkpoint = checkpoint.name(),
                                %phase,
                                reasons = ?report.reasons,
                                "guardrail warning",
                            );
                            all_metadata.insert(
                                checkpoint.name().to_string(),
                                serde_json::json!({ "warning": report.reasons }),
                            );
                            all_reasons.extend(report.reasons.iter().cloned());
                        }
                        _ => {}
                    }
                }
                Ok(Err(err)) => {
                    self.metrics.record_error();
                    tracing::error!(
                        checkpoint = checkpoint.name(),
                        error = %err,
                        "checkpoint failed",
                    );

                    if checkpoint.fail_open() || self.fail_open {
                        all_reasons.push(format!(
                            "checkpoint {} failed (fail_open): {err}",
                            checkpoint.name(),
                        ));
                    } else {
                        return self.failure_block(
                            content,
                            checkpoint.name(),
                            format!("checkpoint {} error: {err}", checkpoint.name()),
                            start,
                        );
                    }
                }
                Err(_elapsed) => {
                    self.metrics.record_error();
                    tracing::error!(checkpoint = checkpoint.name(), "checkpoint timed out");

                    if checkpoint.fail_open() || self.fail_open {
                        all_reasons.push(format!(
                            "checkpoint {} timed out (fail_open)",
                            checkpoint.name(),
                        ));
                    } else {
                        return self.failure_block(
                            content,
                            checkpoint.name(),
                            format!("checkpoint {} timed out", checkpoint.name()),
                            start,
                        );
                    }
                }
            }
        }

        let processing_time_ms = start.elapsed().as_secs_f64() * 1_000.0;
        self.metrics.record_passed(processing_time_ms);

        let mut report = if current_content == content {
            GuardrailReport::allow(PIPELINE_NAME, content)
        } else {
            GuardrailReport::modify(PIPELINE_NAME, content, current_content, Vec::new())
        };
        report.reasons = all_reasons;
        report.metadata = all_metadata;
        report.processing_time_ms = processing_time_ms;
        report
    }

    fn failure_block(
        &self,
        content: &str,
        checkpoint_name: &str,
        reason: String,
        start: Instant,
    ) -> GuardrailReport {
        let mut report = GuardrailReport::block(checkpoint_name, content, vec![reason]);
        report.processing_time_ms = start.elapsed().as_secs_f64() * 1_000.0;
        report
    }

    /// Names of configured checkpoints, per phase.
    #[must_use]
    pub fn checkpoint_names(&self, phase: Phase) -> Vec<String> {
        let list = match phase {
            Phase::Input => &self.input_checkpoints,
            Phase::Output => &self.output_checkpoints,
        };
        list.iter().map(|cp| cp.name().to_string()).collect()
    }

    /// Names of *enabled* checkpoints for a phase (cache key material).
    #[must_use]
    pub(crate) fn enabled_checkpoint_names(&self, phase: Phase) -> Vec<String> {
        let list = match phase {
            Phase::Input => &self.input_checkpoints,
            Phase::Output => &self.output_checkpoints,
        };
        list.iter()
            .filter(|cp| cp.enabled())
            .map(|cp| cp.name().to_string())
            .collect()
    }

    /// The metrics recorder.
    #[must_use]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

// ── RuntimeBuilder ─────────────────────────────────────────────────────

/// Builder for [`GuardrailsRuntime`].
///
/// Checkpoints are dispatched into the input and output lists according
/// to their [`position`](Checkpoint::position); a `Both` checkpoint is
/// registered in each.
#[derive(Default)]
pub struct RuntimeBuilder {
    input_checkpoints: Vec<Arc<dyn Checkpoint>>,
    output_checkpoints: Vec<Arc<dyn Checkpoint>>,
    fail_open: bool,
}

impl RuntimeBuilder {
    /// Add a checkpoint.
    #[must_use]
    pub fn add_checkpoint(self, checkpoint: impl Checkpoint + 'static) -> Self {
        self.add_shared_checkpoint(Arc::new(checkpoint))
    }

    /// Add a pre-wrapped `Arc<dyn Checkpoint>`.
    #[must_use]
    pub fn add_shared_checkpoint(mut self, checkpoint: Arc<dyn Checkpoint>) -> Self {
        if checkpoint.position().covers_input() {
            self.input_checkpoints.push(Arc::clone(&checkpoint));
        }
        if checkpoint.position().covers_output() {
            self.output_checkpoints.push(checkpoint);
        }
        self
    }

    /// Set the runtime-wide fail-open flag (defaults to `false`).
    #[must_use]
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Build the runtime.
    #[must_use]
    pub fn build(self) -> GuardrailsRuntime {
        GuardrailsRuntime {
            input_checkpoints: self.input_checkpoints,
            output_checkpoints: self.output_checkpoints,
            fail_open: self.fail_open,
            metrics: PipelineMetrics::new(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::checkpoint::{CheckpointError, FnCheckpoint, Position};
    use std::time::Duration;

    fn ctx() -> CheckContext {
        CheckContext::default()
    }

    fn allow_checkpoint(name: &'static str) -> FnCheckpoint {
        FnCheckpoint::new(name, Position::Both, move |content, _| async move {
            Ok(GuardrailReport::allow(name, &content))
        })
    }

    fn block_checkpoint(name: &'static str) -> FnCheckpoint {
        FnCheckpoint::new(name, Position::Both, move |content, _| async move {
            Ok(GuardrailReport::block(name, &content, vec!["bad".into()]))
        })
    }

    fn suffix_checkpoint(name: &'static str, suffix: &'static str) -> FnCheckpoint {
        FnCheckpoint::new(name, Position::Both, move |content, _| async move {
            let modified = format!("{content}{suffix}");
            Ok(GuardrailReport::modify(name, &content, modified, vec![]))
        })
    }

    #[tokio::test]
    async fn empty_pipeline_is_transparent() {
        let runtime = GuardrailsRuntime::builder().build();
        let report = runtime.check_input("hello", &ctx()).await;
        assert_eq!(report.action, Verdict::Allow);
        assert!(report.passed);
        assert!(report.modified_content.is_none());
    }

    #[tokio::test]
    async fn block_short_circuits() {
        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(allow_checkpoint("first"))
            .add_checkpoint(block_checkpoint("blocker"))
            .add_checkpoint(allow_checkpoint("never"))
            .build();

        let report = runtime.check_input("bad content", &ctx()).await;
        assert_eq!(report.action, Verdict::Block);
        assert!(!report.passed);
        assert_eq!(report.guardrail_name, "blocker");

        let snap = runtime.metrics().snapshot();
        assert_eq!(snap.blocked, 1);
        assert!(!snap.checkpoints.contains_key("never"));
    }

    #[tokio::test]
    async fn modifications_compose_in_order() {
        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(suffix_checkpoint("a", "-a"))
            .add_checkpoint(suffix_checkpoint("b", "-b"))
            .build();

        let report = runtime.check_input("x", &ctx()).await;
        assert_eq!(report.action, Verdict::Modify);
        assert_eq!(report.modified_content.as_deref(), Some("x-a-b"));
        assert_eq!(report.original_content, "x");
    }

    #[tokio::test]
    async fn timeout_blocks_when_fail_closed() {
        let slow = FnCheckpoint::new("slow", Position::Input, |content, _| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GuardrailReport::allow("slow", &content))
        })
        .timeout(Duration::from_millis(20));

        let runtime = GuardrailsRuntime::builder().add_checkpoint(slow).build();
        let report = runtime.check_input("hi", &ctx()).await;
        assert_eq!(report.action, Verdict::Block);
        assert!(report.reasons[0].contains("timed out"));
    }

    #[tokio::test]
    async fn timeout_passes_when_checkpoint_fail_open() {
        let slow = FnCheckpoint::new("slow", Position::Input, |content, _| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GuardrailReport::allow("slow", &content))
        })
        .timeout(Duration::from_millis(20))
        .fail_open(true);

        let runtime = GuardrailsRuntime::builder().add_checkpoint(slow).build();
        let report = runtime.check_input("hi", &ctx()).await;
        assert!(report.passed);
        assert!(report.reasons[0].contains("fail_open"));
    }

    #[tokio::test]
    async fn checkpoint_error_blocks_when_fail_closed() {
        let failing = FnCheckpoint::new("failing", Position::Input, |_, _| async move {
            Err(CheckpointError::BackendUnavailable {
                checkpoint: "failing".into(),
                reason: "connection refused".into(),
            })
        });

        let runtime = GuardrailsRuntime::builder().add_checkpoint(failing).build();
        let report = runtime.check_input("hi", &ctx()).await;
        assert_eq!(report.action, Verdict::Block);
        assert_eq!(runtime.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn runtime_fail_open_passes_failing_checkpoint() {
        let failing = FnCheckpoint::new("failing", Position::Input, |_, _| async move {
            Err(CheckpointError::BackendUnavailable {
                checkpoint: "failing".into(),
                reason: "down".into(),
            })
        });

        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(failing)
            .fail_open(true)
            .build();
        let report = runtime.check_input("hi", &ctx()).await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn disabled_checkpoint_is_skipped() {
        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(block_checkpoint("blocker").enabled(false))
            .build();

        let report = runtime.check_input("anything", &ctx()).await;
        assert!(report.passed);
        assert!(runtime.metrics().snapshot().checkpoints.is_empty());
    }

    #[tokio::test]
    async fn check_both_skips_model_on_input_block() {
        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(block_checkpoint("gate"))
            .build();

        let exchange = runtime
            .check_both(
                "bad",
                |_input| async move {
                    panic!("model must not be invoked");
                },
                &ctx(),
            )
            .await;

        assert_eq!(exchange.blocked_at, Some(Phase::Input));
        assert!(exchange.final_content.is_none());
        assert!(exchange.output_report.is_none());
    }

    #[tokio::test]
    async fn check_both_passes_modified_input_to_model() {
        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(suffix_checkpoint("rewriter", "-clean"))
            .build();

        let exchange = runtime
            .check_both(
                "prompt",
                |input| async move {
                    assert_eq!(input, "prompt-clean");
                    Ok(format!("echo:{input}"))
                },
                &ctx(),
            )
            .await;

        assert!(exchange.delivered());
        assert_eq!(exchange.final_content.as_deref(), Some("echo:prompt-clean-clean"));
    }

    #[tokio::test]
    async fn check_both_surfaces_model_error() {
        let runtime = GuardrailsRuntime::builder().build();

        let exchange = runtime
            .check_both(
                "prompt",
                |_input| async move { Err("provider 503".into()) },
                &ctx(),
            )
            .await;

        assert!(!exchange.delivered());
        assert!(exchange.model_error.as_deref().unwrap().contains("503"));
        assert!(exchange.blocked_at.is_none());
    }

    #[tokio::test]
    async fn position_routes_checkpoints() {
        let input_only = FnCheckpoint::new("in", Position::Input, |c, _| async move {
            Ok(GuardrailReport::allow("in", &c))
        });
        let output_only = FnCheckpoint::new("out", Position::Output, |c, _| async move {
            Ok(GuardrailReport::allow("out", &c))
        });

        let runtime = GuardrailsRuntime::builder()
            .add_checkpoint(input_only)
            .add_checkpoint(output_only)
            .build();

        assert_eq!(runtime.checkpoint_names(Phase::Input), vec!["in"]);
        assert_eq!(runtime.checkpoint_names(Phase::Output), vec!["out"]);
    }
}
