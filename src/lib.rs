//! ```text
//! RuntimeSettings ─┬─► GuardrailsRuntime ──► Checkpoints ──► Model call
//!                  │        │                  │
//!                  │        │                  ├─► JailbreakFilter
//!                  │        │                  ├─► PiiFilter
//!                  │        │                  ├─► TopicFilter / ToxicityFilter
//!                  │        │                  └─► PolicyCheckpoint
//!                  │        │
//!                  │        └─► CachingRuntime ──► content-addressed verdicts
//!                  │
//!                  ├─► Interceptor ──► rate limit ─► validators ─► modifiers
//!                  │        │                                      ─► risk scorers
//!                  │        └─► AuditLog (bounded ring buffer)
//!                  │
//!                  ├─► Sandbox / SandboxPool ──► bounded subprocess execution
//!                  │
//!                  ├─► AgentEvaluator ──► interception + pattern analysis
//!                  │
//!                  └─► Scoring core ──► Normalizer ─► Aggregator ─► Thresholds
//!                           │
//!                           └─► ComplianceMapper ──► framework gap analysis
//! ```
//!
//! # modelwarden
//!
//! **AI-safety control plane core.**
//!
//! `modelwarden` intercepts, evaluates, and governs traffic to and from
//! AI models: a two-phase guardrails pipeline over prompts and
//! responses, an at-most-once decision engine for agent tool calls with
//! a resource-bounded sandbox, and a scoring core that normalizes
//! pillar metrics, aggregates them into risk classifications, and maps
//! them onto regulatory control frameworks.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use modelwarden::prelude::*;
//!
//! let runtime = GuardrailsRuntime::builder()
//!     .add_checkpoint(JailbreakFilter::with_defaults()?)
//!     .add_checkpoint(PiiFilter::with_defaults()?)
//!     .build();
//!
//! let report = runtime
//!     .check_input("summarize this document", &CheckContext::default())
//!     .await;
//! assert!(report.passed);
//! ```
//!
//! ## Key properties
//!
//! - **Fail closed by default** – a timed-out or failing checkpoint
//!   blocks unless explicitly configured fail-open
//! - **Verdicts, not errors** – the runtime and interceptor never leak
//!   an error to the caller; every outcome is a result structure
//! - **Immutable snapshots** – filters, policies, and thresholds are
//!   configured at startup and replaced wholesale, never mutated under
//!   traffic
//! - **Bounded state** – the audit ring buffer, rate-limiter session
//!   map, and result cache all have hard caps
//!
//! ## Modules
//!
//! - [`config`] – runtime settings with file and env resolution
//! - [`verdict`] – the unified verdict vocabulary and severity table
//! - [`pipeline`] – the two-phase guardrails runtime, metrics, cache
//! - [`filters`] – PII, toxicity, jailbreak, and topic filters
//! - [`policy`] – condition/rule/policy evaluation and the registry
//! - [`interceptor`] – tool-call decisions, rate limiting, audit log
//! - [`sandbox`] – bounded subprocess execution and the pool
//! - [`agent`] – agent-safety evaluation over tool-call traces
//! - [`scoring`] – normalization, aggregation, thresholds, weights
//! - [`compliance`] – regulatory framework mapping and gap analysis

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod agent;
pub mod compliance;
pub mod config;
pub mod filters;
pub mod interceptor;
pub mod pipeline;
pub mod policy;
pub mod sandbox;
pub mod scoring;
pub mod verdict;

/// Re-exports for convenient access to core types.
pub mod prelude {
    pub use crate::agent::{AgentEvaluationReport, AgentEvaluator, ToolSecurityChecker};
    pub use crate::compliance::ComplianceMapper;
    pub use crate::config::{RuntimeSettings, SettingsBuilder};
    pub use crate::filters::{
        FilterChain, JailbreakFilter, PiiFilter, TopicFilter, ToxicityFilter,
    };
    pub use crate::interceptor::{InterceptAction, InterceptResult, Interceptor, ToolCall};
    pub use crate::pipeline::{
        CachingRuntime, CheckContext, Checkpoint, FnCheckpoint, GuardrailReport,
        GuardrailsRuntime, Position,
    };
    pub use crate::policy::{Policy, PolicyCheckpoint, PolicyManager, PolicyRule};
    pub use crate::sandbox::{Sandbox, SandboxConfig, SandboxMode, SandboxPool};
    pub use crate::scoring::{
        AggregationStrategy, PillarScore, RiskLevel, ScoreAggregator, ScoreNormalizer,
        ThresholdManager,
    };
    pub use crate::verdict::{Severity, Verdict};
}
