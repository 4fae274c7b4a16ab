//! Provider and summarization telemetry for Parley.
//!
//! Records every provider attempt with its outcome and latency, counts
//! locally synthesized fallback replies, and tracks the background
//! summarization lifecycle. Snapshots back the `/v1/usage` endpoint.

pub mod engine;
pub mod model;

pub use engine::TelemetryEngine;
pub use model::{
    AttemptOutcome, ProviderAttempt, ProviderStats, SummarizationCounts, SummarizationEvent,
    UsageSnapshot,
};
