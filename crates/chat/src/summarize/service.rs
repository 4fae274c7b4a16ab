//! Summarization service backed by the provider chain.

use async_trait::async_trait;
use chrono::Utc;
use parley_core::error::SummarizationError;
use parley_core::history::{HistoryStore, SummaryRecord};
use parley_core::message::{Message, Role};
use parley_core::summary::{SummarizationService, SummarizeOutcome, SummarizeRequest};
use parley_providers::ProviderOrchestrator;
use parley_providers::prompt::SUMMARIZER_ROLE;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const KEY_DATA_MARKER: &str = "KEY DATA:";
const MAX_KEY_DATA: usize = 12;
const MAX_FALLBACK_LINES: usize = 6;
const MAX_LINE_CHARS: usize = 200;

/// Words that mark a message line as worth keeping in an extractive summary.
const SIGNAL_KEYWORDS: &[&str] = &[
    "budget", "price", "cost", "revenue", "customer", "goal", "deadline", "launch", "plan",
    "decided", "need", "want", "target", "market", "team",
];

/// Asks the provider chain for a summary and stores it.
///
/// If every provider fails, an extractive summary of the cluster is stored
/// instead and the outcome reports `ai_success = false`.
pub struct LlmSummarizer {
    orchestrator: Arc<ProviderOrchestrator>,
    history: Arc<dyn HistoryStore>,
}

impl LlmSummarizer {
    pub fn new(orchestrator: Arc<ProviderOrchestrator>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            orchestrator,
            history,
        }
    }
}

#[async_trait]
impl SummarizationService for LlmSummarizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn summarize(
        &self,
        request: SummarizeRequest,
    ) -> Result<SummarizeOutcome, SummarizationError> {
        request.validate()?;

        let prompt = Message::user(build_prompt(&request.old_messages));
        let (content, key_data, ai_success, error) = match self
            .orchestrator
            .get_response(vec![prompt], true, SUMMARIZER_ROLE)
            .await
        {
            Ok(result) => {
                let (content, key_data) = parse_summary(&result.content);
                info!(
                    session_id = %request.session_id,
                    provider = %result.provider,
                    key_data = key_data.len(),
                    "Summary generated"
                );
                (content, key_data, true, None)
            }
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e, "Summary generation failed, storing extractive summary");
                let (content, key_data) = extractive_summary(&request);
                (content, key_data, false, Some(e.to_string()))
            }
        };

        let record = SummaryRecord {
            id: format!("sum_{}", Uuid::new_v4().simple()),
            session_id: request.session_id,
            index_start: request.index_start,
            index_end: request.index_end,
            content,
            key_data,
            created_at: Utc::now(),
        };
        let summary_id = self.history.store_summary(record).await?;

        Ok(SummarizeOutcome {
            summary_id,
            ai_success,
            error,
        })
    }
}

fn build_prompt(messages: &[Message]) -> String {
    let transcript: String = messages
        .iter()
        .map(|m| format!("{}: {}\n", m.role, m.content.trim()))
        .collect();
    format!(
        "Summarize the conversation below in a short paragraph that keeps every decision, \
         number and commitment. Then write a line containing only `{KEY_DATA_MARKER}` followed by \
         one fact per line (names, amounts, dates, goals).\n\n{transcript}"
    )
}

/// Split a completion into the summary text and its key data lines.
pub fn parse_summary(raw: &str) -> (String, Vec<String>) {
    let upper = raw.to_ascii_uppercase();
    let Some(at) = upper.find(KEY_DATA_MARKER) else {
        return (raw.trim().to_string(), Vec::new());
    };

    let summary = raw[..at].trim();
    let key_data = raw[at + KEY_DATA_MARKER.len()..]
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(MAX_KEY_DATA)
        .collect();

    let content = if summary.is_empty() { raw.trim() } else { summary };
    (content.to_string(), key_data)
}

/// A summary built from the messages themselves, no model involved.
fn extractive_summary(request: &SummarizeRequest) -> (String, Vec<String>) {
    let user_lines: Vec<String> = request
        .old_messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| clip(m.content.trim()))
        .filter(|line| !line.is_empty())
        .collect();

    let signal: Vec<&String> = user_lines.iter().filter(|l| is_signal_line(l)).collect();
    let picked: Vec<&String> = if signal.is_empty() {
        user_lines.iter().take(MAX_FALLBACK_LINES).collect()
    } else {
        signal.into_iter().take(MAX_FALLBACK_LINES).collect()
    };

    let mut content = format!(
        "Messages {}-{} (extractive summary).",
        request.index_start, request.index_end
    );
    for line in &picked {
        content.push_str("\n- ");
        content.push_str(line);
    }

    let key_data = user_lines
        .iter()
        .filter(|l| l.chars().any(|c| c.is_ascii_digit() || c == '$' || c == '%'))
        .take(MAX_KEY_DATA)
        .cloned()
        .collect();

    (content, key_data)
}

/// "- fact", "* fact", "2. fact", "3) fact" -> "fact".
fn strip_list_marker(line: &str) -> String {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let line = match line[digits..].strip_prefix(['.', ')']) {
        Some(rest) if digits > 0 => rest,
        _ => line,
    };
    line.trim().to_string()
}

fn is_signal_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    SIGNAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn clip(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_CHARS) {
        Some((i, _)) => format!("{}…", &line[..i]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingProvider, SuccessProvider};
    use parley_core::error::ProviderError;
    use parley_memory::InMemoryHistory;

    fn request() -> SummarizeRequest {
        SummarizeRequest {
            session_id: "s1".into(),
            old_messages: vec![
                Message::user("I want to open a coffee cart near campus"),
                Message::assistant("Great, what's your budget?"),
                Message::user("About $8,000 and I launch in March"),
                Message::user("hello"),
            ],
            index_start: 0,
            index_end: 3,
        }
    }

    async fn store() -> Arc<InMemoryHistory> {
        let store = Arc::new(InMemoryHistory::new());
        store.create_session_with_id("s1", "alice").await;
        store
    }

    #[test]
    fn parse_summary_with_key_data() {
        let raw = "User plans a coffee cart.\n\nKEY DATA:\n- budget: $8,000\n2. launch: March\n\n";
        let (content, key_data) = parse_summary(raw);
        assert_eq!(content, "User plans a coffee cart.");
        assert_eq!(key_data, vec!["budget: $8,000", "launch: March"]);
    }

    #[test]
    fn list_markers_stripped_but_leading_numbers_kept() {
        assert_eq!(strip_list_marker("  - budget: $8k"), "budget: $8k");
        assert_eq!(strip_list_marker("3) launch: March"), "launch: March");
        assert_eq!(strip_list_marker("2024 revenue: $1M"), "2024 revenue: $1M");
    }

    #[test]
    fn parse_summary_without_marker() {
        let (content, key_data) = parse_summary("  Just a paragraph. ");
        assert_eq!(content, "Just a paragraph.");
        assert!(key_data.is_empty());
    }

    #[test]
    fn parse_summary_marker_case_insensitive() {
        let (_, key_data) = parse_summary("Text\nKey Data:\n* location: campus");
        assert_eq!(key_data, vec!["location: campus"]);
    }

    #[test]
    fn extractive_prefers_signal_lines() {
        let (content, key_data) = extractive_summary(&request());
        assert!(content.starts_with("Messages 0-3"));
        assert!(content.contains("coffee cart"));
        assert!(!content.contains("hello"));
        assert!(!content.contains("budget?"));
        assert_eq!(key_data, vec!["About $8,000 and I launch in March"]);
    }

    #[test]
    fn clip_long_lines() {
        let long = "x".repeat(500);
        assert_eq!(clip(&long).chars().count(), MAX_LINE_CHARS + 1);
        assert_eq!(clip("short"), "short");
    }

    #[tokio::test]
    async fn stores_ai_summary() {
        let store = store().await;
        let provider = Arc::new(SuccessProvider::new(
            "openai",
            "Coffee cart near campus.\nKEY DATA:\n- budget: $8,000",
        ));
        let chain = Arc::new(ProviderOrchestrator::new().add_default(provider.clone()));
        let summarizer = LlmSummarizer::new(chain, store.clone());

        let outcome = summarizer.summarize(request()).await.unwrap();
        assert!(outcome.ai_success);
        assert!(outcome.error.is_none());
        assert!(outcome.summary_id.starts_with("sum_"));

        let stored = store.summaries("s1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Coffee cart near campus.");
        assert_eq!(stored[0].key_data, vec!["budget: $8,000"]);
        assert_eq!((stored[0].index_start, stored[0].index_end), (0, 3));

        let seen = provider.last_request().unwrap();
        assert!(seen.messages[0].content.contains("user: About $8,000"));
        assert_eq!(seen.active_role, SUMMARIZER_ROLE);
    }

    #[tokio::test]
    async fn chain_failure_stores_extractive_summary() {
        let store = store().await;
        let chain = Arc::new(ProviderOrchestrator::new().add_default(Arc::new(
            FailingProvider::new("openai", ProviderError::Network("down".into())),
        )));
        let summarizer = LlmSummarizer::new(chain, store.clone());

        let outcome = summarizer.summarize(request()).await.unwrap();
        assert!(!outcome.ai_success);
        assert!(outcome.error.unwrap().contains("All providers failed"));
        assert_eq!(store.summaries("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_request_rejected() {
        let summarizer = LlmSummarizer::new(Arc::new(ProviderOrchestrator::new()), store().await);
        let mut bad = request();
        bad.old_messages.clear();
        assert!(matches!(
            summarizer.summarize(bad).await,
            Err(SummarizationError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn unknown_session_is_history_error() {
        let summarizer = LlmSummarizer::new(Arc::new(ProviderOrchestrator::new()), store().await);
        let mut req = request();
        req.session_id = "other".into();
        assert!(matches!(
            summarizer.summarize(req).await,
            Err(SummarizationError::History(_))
        ));
    }
}
