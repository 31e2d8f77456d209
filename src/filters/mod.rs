//! Pre-built content filters for common safety checks.
//!
//! Every filter is a [`Checkpoint`](crate::pipeline::Checkpoint) whose
//! evaluation delegates to a `detect` step producing a [`Detection`];
//! the configured on-match verdict decides what happens when the
//! detection fires.  All regex patterns are compiled once at
//! construction and shared across requests.
//!
//! - [`filter`] – the [`ContentFilter`] trait, [`FilterProfile`], and
//!   [`Detection`]
//! - [`pii`] – PII detection and length-preserving redaction
//! - [`toxicity`] – pattern-based toxicity with an optional model seam
//! - [`jailbreak`] – prompt-injection / jailbreak heuristics
//! - [`topic`] – blocked/allowed topic keyword groups
//! - [`chain`] – sequential and parallel filter composition
//!
//! [`ContentFilter`]: filter::ContentFilter
//! [`FilterProfile`]: filter::FilterProfile
//! [`Detection`]: filter::Detection

pub mod chain;
pub mod filter;
pub mod jailbreak;
pub mod pii;
pub mod topic;
pub mod toxicity;

pub use chain::{ChainSummary, FilterChain, default_filter_chain};
pub use filter::{ContentFilter, Detection, FilterProfile};
pub use jailbreak::JailbreakFilter;
pub use pii::{PiiConfig, PiiFilter};
pub use topic::{TopicConfig, TopicFilter};
pub use toxicity::{ToxicityConfig, ToxicityFilter, ToxicityScorer};
