//! Thread-safe telemetry engine: records provider attempts, fallback
//! synthesis, and summarization lifecycle, and serves usage snapshots.

use crate::model::*;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::RwLock;

/// Recent attempts kept for inspection.
const MAX_ATTEMPTS: usize = 5_000;

/// The core telemetry engine.
///
/// Thread-safe via `RwLock`. Locks are held only for counter updates and
/// never across an await.
#[derive(Default)]
pub struct TelemetryEngine {
    /// Most recent attempts (oldest first).
    attempts: RwLock<VecDeque<ProviderAttempt>>,
    /// Running per-provider totals, first-seen order.
    stats: RwLock<Vec<ProviderStats>>,
    /// Counters that are not per-provider.
    totals: RwLock<RunningTotals>,
}

#[derive(Debug, Default)]
struct RunningTotals {
    total_attempts: u64,
    fallback_responses: u64,
    summarization: SummarizationCounts,
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one provider attempt and fold it into the running stats.
    pub fn record_attempt(&self, attempt: ProviderAttempt) {
        {
            let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
            let idx = match stats.iter().position(|s| s.provider == attempt.provider) {
                Some(idx) => idx,
                None => {
                    stats.push(ProviderStats {
                        provider: attempt.provider.clone(),
                        ..Default::default()
                    });
                    stats.len() - 1
                }
            };
            let entry = &mut stats[idx];
            entry.attempts += 1;
            entry.total_latency_ms = entry.total_latency_ms.saturating_add(attempt.latency_ms);
            match attempt.outcome {
                AttemptOutcome::Succeeded => entry.successes += 1,
                AttemptOutcome::Failed => entry.failures += 1,
                AttemptOutcome::TimedOut => entry.timeouts += 1,
            }
            if attempt.error.is_some() {
                entry.last_error = attempt.error.clone();
            }
        }

        self.totals
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .total_attempts += 1;

        let mut attempts = self.attempts.write().unwrap_or_else(|e| e.into_inner());
        if attempts.len() >= MAX_ATTEMPTS {
            attempts.pop_front();
        }
        attempts.push_back(attempt);
    }

    /// Record a reply synthesized locally because the chain failed.
    pub fn record_fallback(&self) {
        self.totals
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .fallback_responses += 1;
    }

    pub fn record_summarization(&self, event: SummarizationEvent) {
        let mut totals = self.totals.write().unwrap_or_else(|e| e.into_inner());
        let counts = &mut totals.summarization;
        match event {
            SummarizationEvent::Dispatched => counts.dispatched += 1,
            SummarizationEvent::Skipped => counts.skipped += 1,
            SummarizationEvent::Succeeded => counts.succeeded += 1,
            SummarizationEvent::Degraded => counts.degraded += 1,
            SummarizationEvent::Failed => counts.failed += 1,
        }
    }

    /// The last `limit` attempts, newest last.
    pub fn recent_attempts(&self, limit: usize) -> Vec<ProviderAttempt> {
        let attempts = self.attempts.read().unwrap_or_else(|e| e.into_inner());
        let skip = attempts.len().saturating_sub(limit);
        attempts.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let providers = self.stats.read().unwrap_or_else(|e| e.into_inner()).clone();
        let totals = self.totals.read().unwrap_or_else(|e| e.into_inner());
        UsageSnapshot {
            providers,
            total_attempts: totals.total_attempts,
            fallback_responses: totals.fallback_responses,
            summarization: totals.summarization.clone(),
            generated_at: Utc::now(),
        }
    }

    /// Clear everything (tests, admin reset).
    pub fn reset(&self) {
        self.attempts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.stats.write().unwrap_or_else(|e| e.into_inner()).clear();
        *self.totals.write().unwrap_or_else(|e| e.into_inner()) = RunningTotals::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_snapshot() {
        let engine = TelemetryEngine::new();
        let snap = engine.snapshot();
        assert!(snap.providers.is_empty());
        assert_eq!(snap.total_attempts, 0);
        assert_eq!(snap.fallback_responses, 0);
    }

    #[test]
    fn attempts_fold_into_provider_stats() {
        let engine = TelemetryEngine::new();
        engine.record_attempt(
            ProviderAttempt::new("openai", 1, AttemptOutcome::Failed, 120).with_error("HTTP 500"),
        );
        engine.record_attempt(ProviderAttempt::new("gemini", 2, AttemptOutcome::TimedOut, 30_000));
        engine.record_attempt(ProviderAttempt::new("openai", 1, AttemptOutcome::Succeeded, 80));

        let snap = engine.snapshot();
        assert_eq!(snap.total_attempts, 3);
        assert_eq!(snap.providers[0].provider, "openai");
        assert_eq!(snap.providers[1].provider, "gemini");

        let openai = snap.provider("openai").unwrap();
        assert_eq!(openai.attempts, 2);
        assert_eq!(openai.successes, 1);
        assert_eq!(openai.failures, 1);
        assert_eq!(openai.avg_latency_ms(), 100);
        assert_eq!(openai.last_error.as_deref(), Some("HTTP 500"));

        assert_eq!(snap.provider("gemini").unwrap().timeouts, 1);
    }

    #[test]
    fn fallback_and_summarization_counters() {
        let engine = TelemetryEngine::new();
        engine.record_fallback();
        engine.record_summarization(SummarizationEvent::Dispatched);
        engine.record_summarization(SummarizationEvent::Skipped);
        engine.record_summarization(SummarizationEvent::Skipped);
        engine.record_summarization(SummarizationEvent::Degraded);

        let snap = engine.snapshot();
        assert_eq!(snap.fallback_responses, 1);
        assert_eq!(snap.summarization.dispatched, 1);
        assert_eq!(snap.summarization.skipped, 2);
        assert_eq!(snap.summarization.degraded, 1);
    }

    #[test]
    fn recent_attempts_are_bounded() {
        let engine = TelemetryEngine::new();
        for i in 0..(MAX_ATTEMPTS + 10) {
            engine.record_attempt(ProviderAttempt::new("p", 1, AttemptOutcome::Succeeded, i as u64));
        }
        let recent = engine.recent_attempts(usize::MAX);
        assert_eq!(recent.len(), MAX_ATTEMPTS);
        assert_eq!(recent[0].latency_ms, 10);
        assert_eq!(engine.recent_attempts(2).len(), 2);
        assert_eq!(engine.snapshot().total_attempts, (MAX_ATTEMPTS + 10) as u64);
    }

    #[test]
    fn reset_clears_everything() {
        let engine = TelemetryEngine::new();
        engine.record_attempt(ProviderAttempt::new("p", 1, AttemptOutcome::Succeeded, 1));
        engine.record_fallback();
        engine.reset();
        let snap = engine.snapshot();
        assert_eq!(snap.total_attempts, 0);
        assert!(snap.providers.is_empty());
        assert!(engine.recent_attempts(10).is_empty());
    }

    #[test]
    fn concurrent_recording() {
        let engine = Arc::new(TelemetryEngine::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        engine.record_attempt(ProviderAttempt::new(
                            "shared",
                            1,
                            AttemptOutcome::Succeeded,
                            1,
                        ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(engine.snapshot().provider("shared").unwrap().attempts, 400);
    }
}
