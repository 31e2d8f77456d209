//! The guardrails pipeline — a two-phase checkpoint chain around model
//! inference.
//!
//! Content flows through an *input* phase before the model is invoked and
//! an *output* phase after it responds.  Each [`Checkpoint`] carries its
//! own timeout budget and fail-open policy; the
//! [`GuardrailsRuntime`](runtime::GuardrailsRuntime) enforces them per
//! step, short-circuits on block, chains modifications forward, and
//! records [`metrics`].
//!
//! - [`checkpoint`] – the [`Checkpoint`] trait, [`CheckContext`],
//!   [`GuardrailReport`], and the closure-based [`FnCheckpoint`]
//! - [`runtime`] – the sequential two-phase runtime and the
//!   input/output/model sandwich
//! - [`metrics`] – counters and running latency means
//! - [`cache`] – the content-addressed result cache for the input phase
//!
//! [`Checkpoint`]: checkpoint::Checkpoint
//! [`CheckContext`]: checkpoint::CheckContext
//! [`GuardrailReport`]: checkpoint::GuardrailReport
//! [`FnCheckpoint`]: checkpoint::FnCheckpoint

pub mod cache;
pub mod checkpoint;
pub mod metrics;
pub mod runtime;

pub use cache::CachingRuntime;
pub use checkpoint::{
    CheckContext, Checkpoint, CheckpointError, FnCheckpoint, GuardrailReport, Position,
};
pub use metrics::{CheckpointMetrics, MetricsSnapshot, PipelineMetrics};
pub use runtime::{ExchangeReport, GuardrailsRuntime, Phase};
