//! Pipeline metrics — counters and running latency means.
//!
//! Owned by the runtime and updated by a single mutator per request; the
//! running mean `μ_new = (μ_old·(n−1) + x)/n` requires the `(n, μ)` pair
//! to advance together, so updates happen under one lock.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::checkpoint::GuardrailReport;

// ── Snapshot types ─────────────────────────────────────────────────────

/// Point-in-time metrics for a single checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    /// Total invocations.
    pub total: u64,
    /// Invocations that passed.
    pub passed: u64,
    /// Invocations that blocked.
    pub blocked: u64,
    /// Running mean latency in milliseconds.
    pub avg_latency_ms: f64,
}

/// Point-in-time snapshot of all pipeline metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total pipeline runs.
    pub total_checks: u64,
    /// Runs that passed all checkpoints unchanged.
    pub passed: u64,
    /// Runs that were blocked.
    pub blocked: u64,
    /// Runs where at least one checkpoint modified the content.
    pub modified: u64,
    /// Checkpoint timeouts and failures.
    pub errors: u64,
    /// Running mean end-to-end latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Per-checkpoint metrics.
    pub checkpoints: FxHashMap<String, CheckpointMetrics>,
    /// `passed / total_checks` (0.0 when no runs recorded).
    pub pass_rate: f64,
    /// `blocked / total_checks` (0.0 when no runs recorded).
    pub block_rate: f64,
}

// ── PipelineMetrics ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    total_checks: u64,
    passed: u64,
    blocked: u64,
    modified: u64,
    errors: u64,
    avg_latency_ms: f64,
    checkpoints: FxHashMap<String, CheckpointMetrics>,
}

/// Thread-safe metrics recorder for the guardrails runtime.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    inner: Mutex<Inner>,
}

impl PipelineMetrics {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the start of a pipeline run.
    pub fn record_run_started(&self) {
        self.lock().total_checks += 1;
    }

    /// Record a blocked run.
    pub fn record_blocked(&self) {
        self.lock().blocked += 1;
    }

    /// Record a checkpoint that modified the content.
    pub fn record_modified(&self) {
        self.lock().modified += 1;
    }

    /// Record a checkpoint timeout or failure.
    pub fn record_error(&self) {
        self.lock().errors += 1;
    }

    /// Record a run that passed every checkpoint, folding the end-to-end
    /// latency into the running mean.
    pub fn record_passed(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.passed += 1;
        let n = inner.total_checks.max(1) as f64;
        inner.avg_latency_ms = (inner.avg_latency_ms * (n - 1.0) + latency_ms) / n;
    }

    /// Fold one checkpoint invocation into its per-checkpoint stats.
    pub fn record_checkpoint(&self, name: &str, report: &GuardrailReport, latency_ms: f64) {
        let mut inner = self.lock();
        let entry = inner.checkpoints.entry(name.to_string()).or_default();
        entry.total += 1;
        if report.passed {
            entry.passed += 1;
        } else {
            entry.blocked += 1;
        }
        let n = entry.total as f64;
        entry.avg_latency_ms = (entry.avg_latency_ms * (n - 1.0) + latency_ms) / n;
    }

    /// Take a snapshot of the current values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let total = inner.total_checks.max(1) as f64;
        MetricsSnapshot {
            total_checks: inner.total_checks,
            passed: inner.passed,
            blocked: inner.blocked,
            modified: inner.modified,
            errors: inner.errors,
            avg_latency_ms: inner.avg_latency_ms,
            checkpoints: inner.checkpoints.clone(),
            pass_rate: inner.passed as f64 / total,
            block_rate: inner.blocked as f64 / total,
        }
    }

    /// Reset all counters and means to zero.
    pub fn reset(&self) {
        *self.lock() = Inner::default();
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::checkpoint::GuardrailReport;

    #[test]
    fn running_mean_matches_definition() {
        let metrics = PipelineMetrics::new();
        let report = GuardrailReport::allow("cp", "x");

        metrics.record_checkpoint("cp", &report, 10.0);
        metrics.record_checkpoint("cp", &report, 20.0);
        metrics.record_checkpoint("cp", &report, 30.0);

        let snap = metrics.snapshot();
        let cp = &snap.checkpoints["cp"];
        assert_eq!(cp.total, 3);
        assert!((cp.avg_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rates_computed_from_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_run_started();
        metrics.record_passed(5.0);
        metrics.record_run_started();
        metrics.record_blocked();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_checks, 2);
        assert!((snap.pass_rate - 0.5).abs() < 1e-9);
        assert!((snap.block_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_everything() {
        let metrics = PipelineMetrics::new();
        metrics.record_run_started();
        metrics.record_blocked();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_checks, 0);
        assert_eq!(snap.blocked, 0);
        assert!(snap.checkpoints.is_empty());
    }

    #[test]
    fn blocked_checkpoint_counted_as_blocked() {
        let metrics = PipelineMetrics::new();
        let report = GuardrailReport::block("cp", "x", vec!["bad".into()]);
        metrics.record_checkpoint("cp", &report, 1.0);

        let snap = metrics.snapshot();
        assert_eq!(snap.checkpoints["cp"].blocked, 1);
        assert_eq!(snap.checkpoints["cp"].passed, 0);
    }
}
