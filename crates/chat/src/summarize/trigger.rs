//! Background summarization trigger.
//!
//! After a turn is persisted the handler hands the session's full raw
//! history to [`SummarizationTrigger::maybe_trigger`]. When the history is
//! long enough, everything except the newest `keep_last_n` messages becomes
//! a candidate interval. The candidate is dispatched to the summarization
//! service on a detached task unless a stored summary already overlaps it.

use parley_config::SummarizationConfig;
use parley_core::history::HistoryStore;
use parley_core::message::Message;
use parley_core::summary::{SummarizationService, SummarizeOutcome, SummarizeRequest};
use parley_telemetry::{SummarizationEvent, TelemetryEngine};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_THRESHOLD: usize = 50;
pub const DEFAULT_KEEP_LAST_N: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizationPolicy {
    pub enabled: bool,
    /// Summarize only when the history is longer than this
    pub threshold: usize,
    /// Newest messages that always stay raw
    pub keep_last_n: usize,
    /// Start after the highest summarized index instead of at 0
    pub incremental: bool,
}

impl Default for SummarizationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            keep_last_n: DEFAULT_KEEP_LAST_N,
            incremental: false,
        }
    }
}

impl From<&SummarizationConfig> for SummarizationPolicy {
    fn from(config: &SummarizationConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            keep_last_n: config.keep_last_n,
            incremental: config.incremental,
        }
    }
}

/// The interval to summarize for a history of `total` messages.
///
/// `summarized_up_to` is the highest `index_end` already stored; it only
/// moves the start under the incremental policy.
pub fn candidate_interval(
    total: usize,
    policy: &SummarizationPolicy,
    summarized_up_to: Option<usize>,
) -> Option<(usize, usize)> {
    if !policy.enabled || total <= policy.threshold || total <= policy.keep_last_n {
        return None;
    }
    let end = total - policy.keep_last_n - 1;
    let start = match (policy.incremental, summarized_up_to) {
        (true, Some(up_to)) => up_to + 1,
        _ => 0,
    };
    (start <= end).then_some((start, end))
}

/// How a dispatched trigger task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Summarized {
        index_start: usize,
        index_end: usize,
        outcome: SummarizeOutcome,
    },
    /// A stored summary already covers part of the candidate
    SkippedOverlap { index_start: usize, index_end: usize },
    /// Incremental policy found nothing new to summarize
    NothingNew,
    /// Existing summaries could not be read; nothing dispatched
    CheckFailed(String),
    /// The service returned an error
    Failed(String),
}

pub struct SummarizationTrigger {
    history: Arc<dyn HistoryStore>,
    service: Arc<dyn SummarizationService>,
    policy: SummarizationPolicy,
    in_flight: Arc<Mutex<HashSet<String>>>,
    telemetry: Option<Arc<TelemetryEngine>>,
}

impl SummarizationTrigger {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        service: Arc<dyn SummarizationService>,
        policy: SummarizationPolicy,
    ) -> Self {
        Self {
            history,
            service,
            policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn policy(&self) -> &SummarizationPolicy {
        &self.policy
    }

    /// Whether a task for `session_id` is currently running.
    pub fn is_in_flight(&self, session_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(session_id)
    }

    /// Spawn a summarization task if the history qualifies.
    ///
    /// Returns immediately. The handle is for supervision; callers on the
    /// request path drop it.
    pub fn maybe_trigger(
        &self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> Option<JoinHandle<TriggerOutcome>> {
        let total = messages.len();
        // Upper bound only; the incremental start needs the stored summaries.
        candidate_interval(total, &self.policy, None)?;

        let guard = match InFlightGuard::acquire(&self.in_flight, session_id) {
            Some(guard) => guard,
            None => {
                info!(session_id, "Summarization already in flight, skipping");
                self.record(SummarizationEvent::Skipped);
                return None;
            }
        };

        let history = Arc::clone(&self.history);
        let service = Arc::clone(&self.service);
        let policy = self.policy.clone();
        let telemetry = self.telemetry.clone();
        let session_id = session_id.to_string();

        Some(tokio::spawn(async move {
            let _guard = guard;
            let record = |event| {
                if let Some(t) = &telemetry {
                    t.record_summarization(event);
                }
            };

            let existing = match history.summaries(&session_id).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Could not check for overlaps, skipping summarization");
                    record(SummarizationEvent::Skipped);
                    return TriggerOutcome::CheckFailed(e.to_string());
                }
            };

            let summarized_up_to = existing.iter().map(|s| s.index_end).max();
            let Some((index_start, index_end)) =
                candidate_interval(total, &policy, summarized_up_to)
            else {
                record(SummarizationEvent::Skipped);
                return TriggerOutcome::NothingNew;
            };

            if let Some(overlapping) = existing.iter().find(|s| s.overlaps(index_start, index_end)) {
                info!(
                    session_id = %session_id,
                    index_start,
                    index_end,
                    existing_start = overlapping.index_start,
                    existing_end = overlapping.index_end,
                    "Summarization skipped, overlap detected"
                );
                record(SummarizationEvent::Skipped);
                return TriggerOutcome::SkippedOverlap {
                    index_start,
                    index_end,
                };
            }

            info!(
                session_id = %session_id,
                service = service.name(),
                index_start,
                index_end,
                total,
                "Triggering background summarization"
            );
            record(SummarizationEvent::Dispatched);

            let request = SummarizeRequest {
                session_id: session_id.clone(),
                old_messages: messages[index_start..=index_end].to_vec(),
                index_start,
                index_end,
            };

            match service.summarize(request).await {
                Ok(outcome) => {
                    if outcome.ai_success {
                        record(SummarizationEvent::Succeeded);
                        info!(session_id = %session_id, summary_id = %outcome.summary_id, "Background summarization succeeded");
                    } else {
                        record(SummarizationEvent::Degraded);
                        warn!(
                            session_id = %session_id,
                            summary_id = %outcome.summary_id,
                            error = outcome.error.as_deref().unwrap_or("unknown"),
                            "Background summarization stored a fallback summary"
                        );
                    }
                    TriggerOutcome::Summarized {
                        index_start,
                        index_end,
                        outcome,
                    }
                }
                Err(e) => {
                    record(SummarizationEvent::Failed);
                    error!(session_id = %session_id, error = %e, "Background summarization failed");
                    TriggerOutcome::Failed(e.to_string())
                }
            }
        }))
    }

    fn record(&self, event: SummarizationEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_summarization(event);
        }
    }
}

/// Holds a session's slot in the in-flight set; released on drop, including
/// when the task panics or is aborted.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, session_id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.session_id);
    }
}
