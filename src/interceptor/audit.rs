//! Bounded audit trail for intercept verdicts.
//!
//! A ring buffer holding up to 10 000 results; on overflow the oldest
//! half is discarded in one truncation, keeping the newest 5 000.
//! Readers take a snapshot — a query never observes a partially
//! truncated buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{InterceptAction, InterceptResult};

/// Buffer capacity before truncation.
const DEFAULT_CAPACITY: usize = 10_000;
/// Entries kept after truncation.
const DEFAULT_RETAIN: usize = 5_000;

// ── AuditQuery ─────────────────────────────────────────────────────────

/// Filter for audit log queries.  Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Restrict to one session.
    pub session_id: Option<String>,
    /// Restrict to one action.
    pub action: Option<InterceptAction>,
    /// Restrict to results at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl AuditQuery {
    /// Match everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one session.
    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restrict to one action.
    #[must_use]
    pub fn action(mut self, action: InterceptAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Restrict to results at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    fn matches(&self, result: &InterceptResult) -> bool {
        if let Some(session) = &self.session_id
            && result.original_call.session_id.as_deref() != Some(session.as_str())
        {
            return false;
        }
        if let Some(action) = self.action
            && result.action != action
        {
            return false;
        }
        if let Some(since) = self.since
            && result.timestamp < since
        {
            return false;
        }
        true
    }
}

// ── AuditStats ─────────────────────────────────────────────────────────

/// Summary statistics over the audit buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    /// Results currently in the buffer.
    pub total_calls: usize,
    /// Allowed calls.
    pub allowed: usize,
    /// Blocked calls.
    pub blocked: usize,
    /// Modified calls.
    pub modified: usize,
    /// Audited calls.
    pub audited: usize,
    /// `blocked / total_calls` (0.0 when empty).
    pub block_rate: f64,
    /// Mean risk score (0.0 when empty).
    pub avg_risk_score: f64,
}

// ── AuditLog ───────────────────────────────────────────────────────────

/// Append-ordered ring buffer of intercept verdicts.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    retain: usize,
    entries: Mutex<VecDeque<InterceptResult>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_RETAIN)
    }
}

impl AuditLog {
    /// Create a log truncating from `capacity` down to `retain`.
    #[must_use]
    pub fn new(capacity: usize, retain: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            retain: retain.min(capacity),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InterceptResult>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a verdict, truncating on overflow.
    pub fn record(&self, result: InterceptResult) {
        let mut entries = self.lock();
        entries.push_back(result);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.retain;
            entries.drain(..excess);
        }
    }

    /// Snapshot the entries matching `query`, in append order.
    #[must_use]
    pub fn query(&self, query: &AuditQuery) -> Vec<InterceptResult> {
        self.lock()
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect()
    }

    /// Number of buffered results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Summary statistics over the buffered results.
    #[must_use]
    pub fn stats(&self) -> AuditStats {
        let entries = self.lock();
        let total = entries.len();
        if total == 0 {
            return AuditStats::default();
        }

        let mut stats = AuditStats {
            total_calls: total,
            ..AuditStats::default()
        };
        let mut risk_sum = 0.0;

        for result in entries.iter() {
            match result.action {
                InterceptAction::Allow => stats.allowed += 1,
                InterceptAction::Block => stats.blocked += 1,
                InterceptAction::Modify => stats.modified += 1,
                InterceptAction::Audit => stats.audited += 1,
            }
            risk_sum += result.risk_score;
        }

        stats.block_rate = stats.blocked as f64 / total as f64;
        stats.avg_risk_score = risk_sum / total as f64;
        stats
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
