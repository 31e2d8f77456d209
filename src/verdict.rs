//! The unified verdict vocabulary shared by every decision path.
//!
//! A [`Verdict`] is the action component of any result — a guardrail
//! checkpoint, a policy rule, or a filter all resolve to one of these
//! actions.  "Highest action wins" semantics are defined by the explicit
//! [`severity table`](Verdict::severity), never by comparing serialized
//! values: the table is the single source of ordering.
//!
//! [`Severity`] classifies findings and security events, ordered from
//! lowest to highest so that comparisons like `severity >= Severity::High`
//! read naturally.

use serde::{Deserialize, Serialize};

// ── Verdict ────────────────────────────────────────────────────────────

/// The action a check, rule, or filter decides to take.
///
/// ```rust
/// use modelwarden::verdict::Verdict;
///
/// assert!(Verdict::Block.severity() > Verdict::Warn.severity());
/// assert!(Verdict::Block.is_blocking());
/// assert!(!Verdict::Audit.is_blocking());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Let the content or call proceed unchanged.
    Allow,
    /// Proceed, but record the event.
    Log,
    /// Proceed, surfacing a warning to the caller.
    Warn,
    /// Proceed, flagging the event for asynchronous audit.
    Audit,
    /// Proceed with a transformed payload.
    Modify,
    /// Escalate for human review before proceeding.
    Review,
    /// Refuse — the content or call must not proceed.
    Block,
}

impl Verdict {
    /// Numeric severity used to merge competing verdicts.
    ///
    /// Higher values win.  The ordering is deliberate: passive
    /// observability actions (`Log`, `Warn`, `Audit`) rank below actions
    /// that alter or stop the request (`Modify`, `Review`, `Block`).
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::Log => 1,
            Self::Warn => 2,
            Self::Audit => 3,
            Self::Modify => 4,
            Self::Review => 5,
            Self::Block => 6,
        }
    }

    /// Whether this verdict stops the request.
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Block)
    }

    /// Merge two verdicts, keeping the more severe one.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Allow => "allow",
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Audit => "audit",
            Self::Modify => "modify",
            Self::Review => "review",
            Self::Block => "block",
        };
        write!(f, "{label}")
    }
}

impl PartialOrd for Verdict {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Verdict {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.severity().cmp(&other.severity())
    }
}

// ── Severity ───────────────────────────────────────────────────────────

/// Severity level for findings and security events.
///
/// Ordered from lowest to highest; `Ord` is derived from variant order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Low risk — may warrant logging.
    Low,
    /// Medium risk — warrants investigation.
    Medium,
    /// High risk — should block in most policies.
    High,
    /// Critical — immediate block and incident trigger.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
