//! Data model for provider attempts, summarization events, and usage snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Provider attempts ─────────────────────────────────────────────────────

/// How one provider attempt ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A single recorded call to one provider in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub id: String,
    pub provider: String,
    /// 1-based position in the chain for this request.
    pub position: usize,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ProviderAttempt {
    pub fn new(
        provider: impl Into<String>,
        position: usize,
        outcome: AttemptOutcome,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            position,
            outcome,
            latency_ms,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Aggregated counters for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub provider: String,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub total_latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ProviderStats {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.attempts == 0 {
            0
        } else {
            self.total_latency_ms / self.attempts
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

// ── Summarization ─────────────────────────────────────────────────────────

/// Lifecycle points of a background summarization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummarizationEvent {
    /// A job was handed to the summarization service.
    Dispatched,
    /// An existing summary overlapped the candidate interval.
    Skipped,
    /// The service stored an AI summary.
    Succeeded,
    /// The service stored a non-AI fallback summary.
    Degraded,
    /// The job failed outright.
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummarizationCounts {
    pub dispatched: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub degraded: u64,
    pub failed: u64,
}

// ── Snapshot ──────────────────────────────────────────────────────────────

/// Point-in-time view served by `GET /v1/usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    /// Per-provider stats, in first-seen order.
    pub providers: Vec<ProviderStats>,
    pub total_attempts: u64,
    /// Requests answered by local synthesis after the chain failed.
    pub fallback_responses: u64,
    pub summarization: SummarizationCounts,
    pub generated_at: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn provider(&self, name: &str) -> Option<&ProviderStats> {
        self.providers.iter().find(|p| p.provider == name)
    }
}
