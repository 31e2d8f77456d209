//! Tool-call interception — an at-most-once-per-call decision engine for
//! agent tool invocations.
//!
//! The [`Interceptor`] admits each [`ToolCall`] through a rate limiter,
//! a validator chain (first failure blocks), a modifier chain (applied
//! in order), and a risk-scorer set (the maximum wins).  The final
//! [`InterceptResult`] satisfies the risk/action invariant: risk ≥ 0.8
//! blocks, risk in [0.5, 0.8) audits, otherwise the call is allowed or
//! reported as modified.
//!
//! Every verdict is recorded in the bounded [`AuditLog`](audit::AuditLog).

pub mod audit;
pub mod rate_limit;

use aho_corasick::AhoCorasick;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::pipeline::checkpoint::Metadata;

pub use audit::{AuditLog, AuditQuery, AuditStats};
pub use rate_limit::RateLimiter;

/// Fixed-string patterns that reject a call outright when found in the
/// serialized arguments.
const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf",
    "sudo",
    "; rm ",
    "| rm ",
    "drop table",
    "delete from",
    "<script>",
    "javascript:",
];

/// Tool-name substrings that contribute +0.4 risk.
const HIGH_RISK_TOOLS: &[&str] = &[
    "execute", "eval", "shell", "command", "run", "delete", "remove", "drop", "truncate", "write",
    "modify", "update",
];

/// Tool-name substrings that contribute +0.2 risk.
const MEDIUM_RISK_TOOLS: &[&str] = &[
    "read", "get", "fetch", "query", "search", "list", "browse", "access",
];

/// Shell metacharacters that contribute +0.2 risk when present in the
/// serialized arguments.
const SPECIAL_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>',
];

// ── ToolCall ───────────────────────────────────────────────────────────

/// A tool/function invocation requested by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name (non-empty by construction).
    pub tool_name: String,
    /// Argument mapping.
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
    /// Session the call belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Agent that issued the call.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Opaque context bag.
    #[serde(default)]
    pub context: Metadata,
}

impl ToolCall {
    /// Create a call with the given name and no arguments.
    #[must_use]
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: serde_json::Map::new(),
            session_id: None,
            agent_id: None,
            context: Metadata::new(),
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// Set the session id.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set the agent id.
    #[must_use]
    pub fn agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    /// The serialized argument representation used by validators and
    /// risk scorers.
    #[must_use]
    pub fn arguments_repr(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_default()
    }
}

// ── InterceptAction / InterceptResult ──────────────────────────────────

/// Actions the interceptor can take on a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptAction {
    /// Forward the call unchanged.
    Allow,
    /// Refuse the call.
    Block,
    /// Forward a rewritten call.
    Modify,
    /// Forward the call, flagging it for audit.
    Audit,
}

impl std::fmt::Display for InterceptAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::Modify => "modify",
            Self::Audit => "audit",
        };
        write!(f, "{label}")
    }
}

/// The interceptor's decision over one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptResult {
    /// Decided action.
    pub action: InterceptAction,
    /// The call as received.
    pub original_call: ToolCall,
    /// The rewritten call, present only for `Modify`.
    pub modified_call: Option<ToolCall>,
    /// Why the action was taken.
    pub reason: Option<String>,
    /// Combined risk score in [0.0, 1.0].
    pub risk_score: f64,
    /// Decision latency in milliseconds.
    pub latency_ms: u64,
    /// When the decision was made (UTC).
    pub timestamp: DateTime<Utc>,
    /// Additional decision metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

// ── Chain function types ───────────────────────────────────────────────

/// A validator: `Err(reason)` blocks the call.
pub type Validator = Box<dyn Fn(&ToolCall) -> Result<(), String> + Send + Sync>;

/// A modifier: rewrites the call.  Applied in registration order.
pub type Modifier = Box<dyn Fn(ToolCall) -> ToolCall + Send + Sync>;

/// A risk scorer: returns a score in [0.0, 1.0].  The maximum across
/// all scorers is the final risk.
pub type RiskScorer = Box<dyn Fn(&ToolCall) -> f64 + Send + Sync>;

// ── Interceptor ────────────────────────────────────────────────────────

/// Validator/modifier/scorer chain over agent tool calls.
pub struct Interceptor {
    allowed_tools: Option<HashSet<String>>,
    blocked_tools: HashSet<String>,
    validators: Vec<Validator>,
    modifiers: Vec<Modifier>,
    risk_scorers: Vec<RiskScorer>,
    rate_limiter: RateLimiter,
    audit_log: Option<AuditLog>,
    dangerous: AhoCorasick,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("allowed_tools", &self.allowed_tools)
            .field("blocked_tools", &self.blocked_tools)
            .field("validators", &self.validators.len())
            .field("modifiers", &self.modifiers.len())
            .field("risk_scorers", &self.risk_scorers.len())
            .finish_non_exhaustive()
    }
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Interceptor {
    /// Start building an interceptor.
    #[must_use]
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::default()
    }

    /// Decide what to do with a tool call.
    ///
    /// Rate limiting runs first; validators, modifiers, and risk
    /// scorers never see a rate-limited call.  This method never fails —
    /// every outcome is an [`InterceptResult`].
    pub fn intercept(&self, call: &ToolCall) -> InterceptResult {
        let start = std::time::Instant::now();
        let session_key = call.session_id.as_deref().unwrap_or("default");

        if !self.rate_limiter.try_admit(session_key) {
            let result = InterceptResult {
                action: InterceptAction::Block,
                original_call: call.clone(),
                modified_call: None,
                reason: Some("rate limit exceeded".to_string()),
                risk_score: 0.0,
                latency_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                metadata: Metadata::new(),
            };
            self.record(&result);
            return result;
        }

        // Built-in validators, then custom ones; first failure blocks.
        let verdict = self
            .validate_tool_allowed(call)
            .and_then(|()| self.validate_arguments(call))
            .and_then(|()| {
                for validator in &self.validators {
                    validator(call)?;
                }
                Ok(())
            });

        if let Err(reason) = verdict {
            let result = InterceptResult {
                action: InterceptAction::Block,
                original_call: call.clone(),
                modified_call: None,
                reason: Some(reason),
                risk_score: 0.0,
                latency_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                metadata: Metadata::new(),
            };
            self.record(&result);
            return result;
        }

        let risk_score = self.calculate_risk(call);

        let mut modified = call.clone();
        for modifier in &self.modifiers {
            modified = modifier(modified);
        }
        let was_modified = modified != *call;

        let (action, reason) = if risk_score >= 0.8 {
            (
                InterceptAction::Block,
                Some(format!("high risk score: {risk_score:.2}")),
            )
        } else if risk_score >= 0.5 {
            (
                InterceptAction::Audit,
                Some(format!("medium risk score: {risk_score:.2}")),
            )
        } else if was_modified {
            (
                InterceptAction::Modify,
                Some("arguments modified for safety".to_string()),
            )
        } else {
            (InterceptAction::Allow, None)
        };

        let mut metadata = Metadata::new();
        if let Some(agent_id) = &call.agent_id {
            metadata.insert(
                "agent_id".to_string(),
                serde_json::Value::String(agent_id.clone()),
            );
        }
        if let Some(session_id) = &call.session_id {
            metadata.insert(
                "session_id".to_string(),
                serde_json::Value::String(session_id.clone()),
            );
        }

        let result = InterceptResult {
            action,
            original_call: call.clone(),
            modified_call: was_modified.then_some(modified),
            reason,
            risk_score,
            latency_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            metadata,
        };
        self.record(&result);
        result
    }

    fn validate_tool_allowed(&self, call: &ToolCall) -> Result<(), String> {
        if self.blocked_tools.contains(&call.tool_name) {
            return Err(format!("tool '{}' is blocked", call.tool_name));
        }
        if let Some(allowed) = &self.allowed_tools
            && !allowed.contains(&call.tool_name)
        {
            return Err(format!("tool '{}' is not in allowed list", call.tool_name));
        }
        Ok(())
    }

    fn validate_arguments(&self, call: &ToolCall) -> Result<(), String> {
        let args = call.arguments_repr();
        if let Some(found) = self.dangerous.find(&args) {
            let pattern = DANGEROUS_PATTERNS[found.pattern().as_usize()];
            return Err(format!("dangerous pattern detected: {pattern}"));
        }
        Ok(())
    }

    fn default_risk_score(&self, call: &ToolCall) -> f64 {
        let mut risk: f64 = 0.0;
        let tool_lower = call.tool_name.to_lowercase();

        if HIGH_RISK_TOOLS.iter().any(|p| tool_lower.contains(p)) {
            risk += 0.4;
        }
        if MEDIUM_RISK_TOOLS.iter().any(|p| tool_lower.contains(p)) {
            risk += 0.2;
        }

        let args = call.arguments_repr();
        if args.len() > 1_000 {
            risk += 0.2;
        }
        if args.contains(SPECIAL_CHARS) {
            risk += 0.2;
        }

        risk.min(1.0)
    }

    fn calculate_risk(&self, call: &ToolCall) -> f64 {
        let mut risk = self.default_risk_score(call);
        for scorer in &self.risk_scorers {
            risk = risk.max(scorer(call).clamp(0.0, 1.0));
        }
        risk
    }

    fn record(&self, result: &InterceptResult) {
        if result.action == InterceptAction::Block {
            tracing::warn!(
                tool = result.original_call.tool_name,
                reason = result.reason.as_deref().unwrap_or(""),
                risk = result.risk_score,
                "tool call blocked",
            );
        }
        if let Some(log) = &self.audit_log {
            log.record(result.clone());
        }
    }

    /// The audit log, when auditing is enabled.
    #[must_use]
    pub fn audit_log(&self) -> Option<&AuditLog> {
        self.audit_log.as_ref()
    }
}

// ── InterceptorBuilder ─────────────────────────────────────────────────

/// Builder for [`Interceptor`].
pub struct InterceptorBuilder {
    allowed_tools: Option<HashSet<String>>,
    blocked_tools: HashSet<String>,
    rate_limit_per_minute: usize,
    enable_audit: bool,
    validators: Vec<Validator>,
    modifiers: Vec<Modifier>,
    risk_scorers: Vec<RiskScorer>,
}

impl Default for InterceptorBuilder {
    fn default() -> Self {
        Self {
            allowed_tools: None,
            blocked_tools: HashSet::new(),
            rate_limit_per_minute: 60,
            enable_audit: true,
            validators: Vec::new(),
            modifiers: Vec::new(),
            risk_scorers: Vec::new(),
        }
    }
}

impl InterceptorBuilder {
    /// Restrict to an allow-list of tool names.
    #[must_use]
    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.allowed_tools = Some(tools.into_iter().collect());
        self
    }

    /// Add to the deny-list of tool names.
    #[must_use]
    pub fn blocked_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.blocked_tools.extend(tools);
        self
    }

    /// Set the per-session admissions per minute (default 60).
    #[must_use]
    pub fn rate_limit_per_minute(mut self, limit: usize) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    /// Enable or disable the audit log (default enabled).
    #[must_use]
    pub fn enable_audit(mut self, enable: bool) -> Self {
        self.enable_audit = enable;
        self
    }

    /// Add a custom validator.
    #[must_use]
    pub fn validator(
        mut self,
        validator: impl Fn(&ToolCall) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Add a custom modifier.
    #[must_use]
    pub fn modifier(
        mut self,
        modifier: impl Fn(ToolCall) -> ToolCall + Send + Sync + 'static,
    ) -> Self {
        self.modifiers.push(Box::new(modifier));
        self
    }

    /// Add a custom risk scorer.
    #[must_use]
    pub fn risk_scorer(mut self, scorer: impl Fn(&ToolCall) -> f64 + Send + Sync + 'static) -> Self {
        self.risk_scorers.push(Box::new(scorer));
        self
    }

    /// Build the interceptor.
    ///
    /// The dangerous-pattern automaton is compiled once here and shared
    /// across every call.
    #[must_use]
    pub fn build(self) -> Interceptor {
        let dangerous = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(DANGEROUS_PATTERNS)
            .unwrap_or_else(|e| {
                // The pattern set is a compile-time constant; this can
                // only fire if the constant itself is broken.
                unreachable!("built-in dangerous pattern set failed to compile: {e}")
            });

        Interceptor {
            allowed_tools: self.allowed_tools,
            blocked_tools: self.blocked_tools,
            validators: self.validators,
            modifiers: self.modifiers,
            risk_scorers: self.risk_scorers,
            rate_limiter: RateLimiter::new(self.rate_limit_per_minute, Duration::from_secs(60)),
            audit_log: self.enable_audit.then(AuditLog::default),
            dangerous,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
