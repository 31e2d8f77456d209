//! Tagged-condition policy rules evaluated over content and context.
//!
//! A [`Policy`] is an ordered collection of [`PolicyRule`]s, each made
//! of [`PolicyCondition`]s over the content string or a dotted path into
//! the request context.  Rules are evaluated in descending priority; the
//! most severe verdict (per the [`Verdict`] severity table) wins, with
//! `Block` short-circuiting.
//!
//! [`PolicyCheckpoint`] mounts a set of policies as a pipeline stage;
//! [`PolicyManager`] keeps a named registry with JSON import/export.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::checkpoint::{
    CheckContext, Checkpoint, CheckpointError, GuardrailReport, Position,
};
use crate::verdict::Verdict;

// ── Errors ─────────────────────────────────────────────────────────────

/// Errors raised while constructing or (de)serializing policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A `matches` condition carries an invalid regex.
    #[error("invalid regex in condition on '{field}': {source}")]
    InvalidRegex {
        /// Condition field.
        field: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// JSON (de)serialization failed.
    #[error("policy serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── ConditionOperator ──────────────────────────────────────────────────

/// Operators available to policy conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field equals the value.
    Equals,
    /// Field differs from the value.
    NotEquals,
    /// Field (string or array) contains the value.
    Contains,
    /// Field does not contain the value.
    NotContains,
    /// Field matches the regex value.
    Matches,
    /// Field is numerically greater than the value.
    GreaterThan,
    /// Field is numerically less than the value.
    LessThan,
    /// Field is one of the values in the array.
    In,
    /// Field is none of the values in the array.
    NotIn,
    /// Field is present.
    Exists,
    /// Field is absent.
    NotExists,
}

// ── PolicyCondition ────────────────────────────────────────────────────

/// One condition of a policy rule.
///
/// `field` is either `"content"`, a dotted path prefixed `"context."`,
/// or a bare context key (falling back to the content when absent).
/// `matches` conditions compile their regex at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCondition {
    /// Field selector.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Comparison value.
    pub value: Value,
    /// Case-sensitive string comparison (default `false`).
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(skip)]
    compiled: Option<Regex>,
}

impl PolicyCondition {
    /// Create a condition, compiling the regex for `matches` operators.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRegex`] for an uncompilable
    /// `matches` pattern.
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: Value,
    ) -> Result<Self, PolicyError> {
        Self::with_case_sensitivity(field, operator, value, false)
    }

    /// Create a condition with explicit case sensitivity.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRegex`] for an uncompilable
    /// `matches` pattern.
    pub fn with_case_sensitivity(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: Value,
        case_sensitive: bool,
    ) -> Result<Self, PolicyError> {
        let field = field.into();
        let compiled = if operator == ConditionOperator::Matches {
            let pattern = value.as_str().unwrap_or_default();
            Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|source| PolicyError::InvalidRegex {
                        field: field.clone(),
                        source,
                    })?,
            )
        } else {
            None
        };

        Ok(Self {
            field,
            operator,
            value,
            case_sensitive,
            compiled,
        })
    }

    /// Re-compile the regex after deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRegex`] for an uncompilable
    /// `matches` pattern.
    fn recompile(&mut self) -> Result<(), PolicyError> {
        if self.operator == ConditionOperator::Matches && self.compiled.is_none() {
            let pattern = self.value.as_str().unwrap_or_default();
            self.compiled = Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(!self.case_sensitive)
                    .build()
                    .map_err(|source| PolicyError::InvalidRegex {
                        field: self.field.clone(),
                        source,
                    })?,
            );
        }
        Ok(())
    }

    fn resolve_field(&self, content: &str, ctx: &CheckContext) -> Option<Value> {
        if self.field == "content" {
            return Some(Value::String(content.to_string()));
        }
        if let Some(path) = self.field.strip_prefix("context.") {
            return ctx.lookup(path).cloned();
        }
        // Bare key: try the context first, fall back to the content.
        ctx.lookup(&self.field)
            .cloned()
            .or_else(|| Some(Value::String(content.to_string())))
    }

    fn fold_case(&self, value: &Value) -> Value {
        match value {
            Value::String(s) if !self.case_sensitive => Value::String(s.to_lowercase()),
            other => other.clone(),
        }
    }

    /// Evaluate the condition.
    #[must_use]
    pub fn evaluate(&self, content: &str, ctx: &CheckContext) -> bool {
        let field_value = self.resolve_field(content, ctx);

        match self.operator {
            ConditionOperator::Exists => return field_value.is_some(),
            ConditionOperator::NotExists => return field_value.is_none(),
            _ => {}
        }

        let Some(field_value) = field_value else {
            return false;
        };

        let folded_field = self.fold_case(&field_value);
        let folded_value = self.fold_case(&self.value);

        match self.operator {
            ConditionOperator::Equals => folded_field == folded_value,
            ConditionOperator::NotEquals => folded_field != folded_value,
            ConditionOperator::Contains => contains(&folded_field, &folded_value),
            ConditionOperator::NotContains => !contains(&folded_field, &folded_value),
            ConditionOperator::Matches => {
                let haystack = match &field_value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.compiled
                    .as_ref()
                    .is_some_and(|re| re.is_match(&haystack))
            }
            ConditionOperator::GreaterThan => {
                compare_numbers(&field_value, &self.value).is_some_and(|ord| ord.is_gt())
            }
            ConditionOperator::LessThan => {
                compare_numbers(&field_value, &self.value).is_some_and(|ord| ord.is_lt())
            }
            ConditionOperator::In => folded_value
                .as_array()
                .is_some_and(|arr| arr.iter().any(|v| self.fold_case(v) == folded_field)),
            ConditionOperator::NotIn => !folded_value
                .as_array()
                .is_some_and(|arr| arr.iter().any(|v| self.fold_case(v) == folded_field)),
            ConditionOperator::Exists | ConditionOperator::NotExists => unreachable!(),
        }
    }
}

fn contains(field: &Value, needle: &Value) -> bool {
    match (field, needle) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), needle) => items.contains(needle),
        _ => false,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let a = a.as_f64()?;
    let b = b.as_f64()?;
    a.partial_cmp(&b)
}

// ── PolicyRule ─────────────────────────────────────────────────────────

/// A content transform attached to a `Modify` rule.
pub type RuleModifier = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One rule of a policy.
#[derive(Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule name.
    pub name: String,
    /// Conditions combined per [`match_all`](Self::match_all).
    pub conditions: Vec<PolicyCondition>,
    /// Verdict when the rule fires.
    pub action: Verdict,
    /// Message surfaced in the result when the rule fires.
    #[serde(default)]
    pub message: String,
    /// Evaluation priority — higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Whether the rule participates in evaluation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `true` = all conditions must match (AND); `false` = any (OR).
    #[serde(default = "default_true")]
    pub match_all: bool,
    /// Content transform for `Modify` rules.  Not serialized.
    #[serde(skip)]
    pub modifier: Option<RuleModifier>,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRule")
            .field("name", &self.name)
            .field("conditions", &self.conditions.len())
            .field("action", &self.action)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("match_all", &self.match_all)
            .finish_non_exhaustive()
    }
}

impl PolicyRule {
    /// Create an enabled all-must-match rule.
    #[must_use]
    pub fn new(name: impl Into<String>, conditions: Vec<PolicyCondition>, action: Verdict) -> Self {
        Self {
            name: name.into(),
            conditions,
            action,
            message: String::new(),
            priority: 0,
            enabled: true,
            match_all: true,
            modifier: None,
        }
    }

    /// Set the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Switch to any-must-match (OR) combination.
    #[must_use]
    pub fn match_any(mut self) -> Self {
        self.match_all = false;
        self
    }

    /// Attach a content transform for `Modify` rules.
    #[must_use]
    pub fn modifier(mut self, modifier: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Evaluate the rule; `Some(action)` when it fires.
    #[must_use]
    pub fn evaluate(&self, content: &str, ctx: &CheckContext) -> Option<Verdict> {
        if !self.enabled || self.conditions.is_empty() {
            return None;
        }

        let fired = if self.match_all {
            self.conditions.iter().all(|c| c.evaluate(content, ctx))
        } else {
            self.conditions.iter().any(|c| c.evaluate(content, ctx))
        };

        fired.then_some(self.action)
    }

    /// Apply the modifier when present.
    #[must_use]
    pub fn apply_modifier(&self, content: &str) -> String {
        match &self.modifier {
            Some(modifier) => modifier(content),
            None => content.to_string(),
        }
    }
}

// ── Policy ─────────────────────────────────────────────────────────────

/// An ordered collection of rules with a fail action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name.
    pub name: String,
    /// The rules, evaluated in descending priority.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Version tag.
    #[serde(default = "default_version")]
    pub version: String,
    /// Whether the policy participates in evaluation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Verdict applied when rule evaluation itself fails.
    #[serde(default = "default_fail_action")]
    pub fail_action: Verdict,
    /// Creation timestamp (UTC).
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (UTC).
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_fail_action() -> Verdict {
    Verdict::Warn
}

impl Policy {
    /// Create an empty enabled policy.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            rules: Vec::new(),
            description: String::new(),
            version: default_version(),
            enabled: true,
            fail_action: default_fail_action(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a rule.
    #[must_use]
    pub fn rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append a rule in place, refreshing the update timestamp.
    pub fn add_rule(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
        self.updated_at = Utc::now();
    }

    /// Remove a rule by name, refreshing the update timestamp.
    pub fn remove_rule(&mut self, name: &str) -> Option<PolicyRule> {
        let idx = self.rules.iter().position(|r| r.name == name)?;
        self.updated_at = Utc::now();
        Some(self.rules.remove(idx))
    }

    /// Evaluate every rule against the content.
    ///
    /// Returns the winning verdict (most severe per the severity table,
    /// `Block` short-circuiting) and the rules that fired.
    #[must_use]
    pub fn evaluate(&self, content: &str, ctx: &CheckContext) -> (Verdict, Vec<&PolicyRule>) {
        if !self.enabled {
            return (Verdict::Allow, Vec::new());
        }

        let mut sorted: Vec<&PolicyRule> = self.rules.iter().filter(|r| r.enabled).collect();
        sorted.sort_by_key(|r| std::cmp::Reverse(r.priority));

        let mut matching: Vec<&PolicyRule> = Vec::new();
        let mut winning = Verdict::Allow;

        for rule in sorted {
            if let Some(action) = rule.evaluate(content, ctx) {
                matching.push(rule);
                if action == Verdict::Block {
                    return (Verdict::Block, matching);
                }
                winning = winning.max(action);
            }
        }

        (winning, matching)
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Serialization`] on failure.
    pub fn to_json(&self) -> Result<String, PolicyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from a JSON string, re-compiling condition regexes.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] on malformed JSON or an uncompilable
    /// `matches` pattern.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let mut policy: Self = serde_json::from_str(json)?;
        for rule in &mut policy.rules {
            for condition in &mut rule.conditions {
                condition.recompile()?;
            }
        }
        Ok(policy)
    }
}

// ── PolicyCheckpoint ───────────────────────────────────────────────────

/// A pipeline checkpoint that enforces a set of policies.
#[derive(Debug, Clone)]
pub struct PolicyCheckpoint {
    name: String,
    position: Position,
    fail_open: bool,
    timeout: Duration,
    policies: Vec<Policy>,
}

impl PolicyCheckpoint {
    /// Mount the given policies as a checkpoint.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Position, policies: Vec<Policy>) -> Self {
        Self {
            name: name.into(),
            position,
            fail_open: false,
            timeout: Duration::from_millis(5_000),
            policies,
        }
    }

    /// Set the fail-open policy.
    #[must_use]
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// The mounted policies.
    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }
}

#[async_trait::async_trait]
impl Checkpoint for PolicyCheckpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Position {
        self.position
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
        let mut winning = Verdict::Allow;
        let mut modified_content = content.to_string();
        let mut messages: Vec<String> = Vec::new();
        let mut matched_rules: Vec<String> = Vec::new();

        for policy in &self.policies {
            if !policy.enabled {
                continue;
            }

            let (action, rules) = policy.evaluate(&modified_content, ctx);

            for rule in &rules {
                matched_rules.push(rule.name.clone());
                if !rule.message.is_empty() {
                    messages.push(rule.message.clone());
                }
            }

            if action == Verdict::Block {
                let reasons = if messages.is_empty() {
                    vec![format!("blocked by policy: {}", policy.name)]
                } else {
                    messages
                };
                let mut report = GuardrailReport::block(&self.name, content, reasons);
                report.metadata.insert(
                    "policy".to_string(),
                    serde_json::Value::String(policy.name.clone()),
                );
                report
                    .metadata
                    .insert("rules".to_string(), serde_json::json!(matched_rules));
                return Ok(report);
            }

            if action == Verdict::Modify {
                for rule in rules {
                    if rule.action == Verdict::Modify {
                        modified_content = rule.apply_modifier(&modified_content);
                    }
                }
            }

            winning = winning.max(action);
        }

        let mut report = if modified_content != content {
            GuardrailReport::modify(&self.name, content, modified_content, messages)
        } else {
            // A modify rule whose transform was a no-op degrades to a
            // warning, keeping the modify invariant.
            let action = if winning == Verdict::Modify {
                Verdict::Warn
            } else {
                winning
            };
            GuardrailReport::with_verdict(action, &self.name, content, messages)
        };
        report
            .metadata
            .insert("matching_rules".to_string(), serde_json::json!(matched_rules));
        Ok(report)
    }
}

// ── PolicyManager ──────────────────────────────────────────────────────

/// Named registry of policies.
#[derive(Debug, Default)]
pub struct PolicyManager {
    policies: FxHashMap<String, Policy>,
}

impl PolicyManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under its name.
    pub fn add_policy(&mut self, policy: Policy) {
        self.policies.insert(policy.name.clone(), policy);
    }

    /// Fetch a policy by name.
    #[must_use]
    pub fn get_policy(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    /// Remove and return a policy by name.
    pub fn remove_policy(&mut self, name: &str) -> Option<Policy> {
        self.policies.remove(name)
    }

    /// Summaries of every registered policy, sorted by name.
    #[must_use]
    pub fn list_policies(&self) -> Vec<(String, usize, bool)> {
        let mut entries: Vec<(String, usize, bool)> = self
            .policies
            .values()
            .map(|p| (p.name.clone(), p.rules.len(), p.enabled))
            .collect();
        entries.sort();
        entries
    }

    /// Enable a policy by name; `false` when absent.
    pub fn enable_policy(&mut self, name: &str) -> bool {
        self.policies
            .get_mut(name)
            .map(|p| p.enabled = true)
            .is_some()
    }

    /// Disable a policy by name; `false` when absent.
    pub fn disable_policy(&mut self, name: &str) -> bool {
        self.policies
            .get_mut(name)
            .map(|p| p.enabled = false)
            .is_some()
    }

    /// Build a checkpoint from selected policies (all when `None`).
    #[must_use]
    pub fn create_checkpoint(
        &self,
        name: impl Into<String>,
        position: Position,
        policy_names: Option<&[&str]>,
    ) -> PolicyCheckpoint {
        let policies = match policy_names {
            Some(names) => names
                .iter()
                .filter_map(|n| self.policies.get(*n).cloned())
                .collect(),
            None => {
                let mut all: Vec<Policy> = self.policies.values().cloned().collect();
                all.sort_by(|a, b| a.name.cmp(&b.name));
                all
            }
        };
        PolicyCheckpoint::new(name, position, policies)
    }

    /// Export every policy as a JSON object keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Serialization`] on failure.
    pub fn export_json(&self) -> Result<String, PolicyError> {
        let map: std::collections::BTreeMap<&String, &Policy> = self.policies.iter().collect();
        Ok(serde_json::to_string_pretty(&map)?)
    }

    /// Import policies from a JSON object keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] on malformed JSON or an uncompilable
    /// `matches` pattern.
    pub fn import_json(&mut self, json: &str) -> Result<(), PolicyError> {
        let map: FxHashMap<String, Policy> = serde_json::from_str(json)?;
        for (name, mut policy) in map {
            for rule in &mut policy.rules {
                for condition in &mut rule.conditions {
                    condition.recompile()?;
                }
            }
            self.policies.insert(name, policy);
        }
        Ok(())
    }
}

// ── Default policies ───────────────────────────────────────────────────

/// The default input policy: blocks prompt injection and system-prompt
/// extraction, warns on role-play jailbreak phrasing.
///
/// # Errors
///
/// Returns [`PolicyError`] if a built-in pattern fails to compile.
pub fn default_input_policy() -> Result<Policy, PolicyError> {
    Ok(Policy::new("default_input")
        .description("Default input guardrail policy")
        .rule(
            PolicyRule::new(
                "block_prompt_injection",
                vec![PolicyCondition::new(
                    "content",
                    ConditionOperator::Matches,
                    Value::String(
                        r"ignore\s+(all\s+)?(previous|prior|above)\s+(instructions|prompts|rules)"
                            .to_string(),
                    ),
                )?],
                Verdict::Block,
            )
            .message("Potential prompt injection detected")
            .priority(100),
        )
        .rule(
            PolicyRule::new(
                "block_system_prompt_extraction",
                vec![PolicyCondition::new(
                    "content",
                    ConditionOperator::Matches,
                    Value::String(
                        r"(show|reveal|tell|print|output|display)\s+(me\s+)?(your|the)\s+(system\s+)?(prompt|instructions)"
                            .to_string(),
                    ),
                )?],
                Verdict::Block,
            )
            .message("System prompt extraction attempt detected")
            .priority(95),
        )
        .rule(
            PolicyRule::new(
                "warn_jailbreak_attempt",
                vec![PolicyCondition::new(
                    "content",
                    ConditionOperator::Matches,
                    Value::String(
                        r"(pretend|act\s+as\s+if|imagine)\s+(you\s+)?(are|have|were|can)"
                            .to_string(),
                    ),
                )?],
                Verdict::Warn,
            )
            .message("Potential jailbreak attempt")
            .priority(80),
        ))
}

/// The default output policy: blocks SSN and credit-card numbers.
///
/// # Errors
///
/// Returns [`PolicyError`] if a built-in pattern fails to compile.
pub fn default_output_policy() -> Result<Policy, PolicyError> {
    Ok(Policy::new("default_output")
        .description("Default output guardrail policy")
        .rule(
            PolicyRule::new(
                "block_ssn_output",
                vec![PolicyCondition::new(
                    "content",
                    ConditionOperator::Matches,
                    Value::String(r"\b\d{3}-\d{2}-\d{4}\b".to_string()),
                )?],
                Verdict::Block,
            )
            .message("SSN detected in output")
            .priority(100),
        )
        .rule(
            PolicyRule::new(
                "block_credit_card_output",
                vec![PolicyCondition::new(
                    "content",
                    ConditionOperator::Matches,
                    Value::String(r"\b(?:\d{4}[-\s]?){3}\d{4}\b".to_string()),
                )?],
                Verdict::Block,
            )
            .message("Credit card number detected in output")
            .priority(100),
        ))
}

// ── Tests ──────────────────────────────────────────────────────────────
