//! Context assembly: blends summarized history with the most recent raw
//! messages under an estimated token budget.
//!
//! Output order is fixed: summaries as `system` messages by ascending
//! `index_start`, then raw messages oldest first. Assembly never fails; a
//! history error degrades to the tail of the incoming messages.

use super::token::estimate_tokens;
use parley_core::history::HistoryStore;
use parley_core::message::Message;
use parley_core::sanitize::MessageSanitizer;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_LAST_N: usize = 20;
pub const DEFAULT_TOKEN_BUDGET: usize = 3000;

/// Where the assembled messages came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Summaries followed by recent raw messages
    Hybrid,
    /// Stored raw messages only; the session has no summaries yet
    RawOnly,
    /// History was unavailable; built from the incoming request
    FallbackRaw,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetadata {
    pub summaries_count: usize,
    pub raw_count: usize,
    pub estimated_tokens: usize,
    pub token_budget: usize,
    pub over_budget: bool,
    /// Messages removed to meet the budget (enforcement only)
    pub dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub messages: Vec<Message>,
    pub kind: ContextKind,
    pub metadata: ContextMetadata,
}

pub struct ContextAssembler {
    history: Arc<dyn HistoryStore>,
    sanitizer: MessageSanitizer,
    enforce_budget: bool,
}

impl ContextAssembler {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self {
            history,
            sanitizer: MessageSanitizer::default(),
            enforce_budget: false,
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: MessageSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Drop messages until the estimate fits the budget. Off by default.
    pub fn with_enforced_budget(mut self, enforce: bool) -> Self {
        self.enforce_budget = enforce;
        self
    }

    pub async fn assemble(
        &self,
        session_id: &str,
        incoming: &[Message],
        last_n: usize,
        token_budget: usize,
    ) -> AssembledContext {
        let loaded = async {
            let summaries = self.history.summaries(session_id).await?;
            let recent = self.history.recent_messages(session_id, last_n).await?;
            Ok::<_, parley_core::error::HistoryError>((summaries, recent))
        }
        .await;

        let (summaries, raw, kind, fallback_reason) = match loaded {
            Ok((summaries, recent)) => {
                let kind = if summaries.is_empty() {
                    ContextKind::RawOnly
                } else {
                    ContextKind::Hybrid
                };
                let summaries: Vec<Message> = summaries.iter().map(|s| s.to_message()).collect();
                (summaries, recent, kind, None)
            }
            Err(e) => {
                warn!(session_id, error = %e, "History unavailable, falling back to raw incoming messages");
                let mut raw = self.sanitizer.sanitize(incoming.to_vec());
                let skip = raw.len().saturating_sub(last_n);
                raw.drain(..skip);
                (Vec::new(), raw, ContextKind::FallbackRaw, Some(e.to_string()))
            }
        };

        self.finish(summaries, raw, kind, fallback_reason, token_budget)
    }

    fn finish(
        &self,
        mut summaries: Vec<Message>,
        mut raw: Vec<Message>,
        kind: ContextKind,
        fallback_reason: Option<String>,
        token_budget: usize,
    ) -> AssembledContext {
        let cost = |m: &Message| estimate_tokens(&m.content);
        let mut estimated_tokens: usize = summaries.iter().chain(raw.iter()).map(cost).sum();
        let over_budget = estimated_tokens > token_budget;
        let mut dropped = 0;

        if over_budget && self.enforce_budget {
            // Oldest summary first, then oldest raw; the newest raw message stays.
            while estimated_tokens > token_budget {
                let removed = if !summaries.is_empty() {
                    summaries.remove(0)
                } else if raw.len() > 1 {
                    raw.remove(0)
                } else {
                    break;
                };
                estimated_tokens -= cost(&removed);
                dropped += 1;
            }
        } else if over_budget {
            debug!(estimated_tokens, token_budget, "Context exceeds token budget (advisory)");
        }

        let metadata = ContextMetadata {
            summaries_count: summaries.len(),
            raw_count: raw.len(),
            estimated_tokens,
            token_budget,
            over_budget,
            dropped,
            fallback_reason,
        };

        info!(
            kind = ?kind,
            summaries = metadata.summaries_count,
            raw = metadata.raw_count,
            estimated_tokens,
            token_budget,
            over_budget,
            dropped,
            "Context assembled"
        );

        summaries.append(&mut raw);
        AssembledContext {
            messages: summaries,
            kind,
            metadata,
        }
    }
}
