//! In-memory history: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use parley_core::error::HistoryError;
use parley_core::history::{HistoryStore, SummaryRecord};
use parley_core::message::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct SessionData {
    owner: String,
    messages: Vec<Message>,
    summaries: Vec<SummaryRecord>,
}

/// Sessions, messages and summaries held in a map.
/// Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session under a caller-chosen id. Replaces nothing: an
    /// existing id keeps its owner and history.
    pub async fn create_session_with_id(&self, session_id: &str, owner: &str) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| SessionData {
                owner: owner.to_string(),
                messages: Vec::new(),
                summaries: Vec::new(),
            });
    }

    /// Number of sessions held.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_session(&self, owner: &str) -> Result<String, HistoryError> {
        let id = Uuid::new_v4().to_string();
        self.create_session_with_id(&id, owner).await;
        Ok(id)
    }

    async fn session_owner(&self, session_id: &str) -> Result<Option<String>, HistoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.owner.clone()))
    }

    async fn append_message(&self, session_id: &str, message: Message) -> Result<(), HistoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| HistoryError::SessionNotFound(session_id.to_string()))?;
        session.messages.push(message);
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        last_n: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| HistoryError::SessionNotFound(session_id.to_string()))?;
        let skip = session.messages.len().saturating_sub(last_n);
        Ok(session.messages[skip..].to_vec())
    }

    async fn all_messages(&self, session_id: &str) -> Result<Vec<Message>, HistoryError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.messages.clone())
            .ok_or_else(|| HistoryError::SessionNotFound(session_id.to_string()))
    }

    async fn summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, HistoryError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| HistoryError::SessionNotFound(session_id.to_string()))?;
        let mut summaries = session.summaries.clone();
        summaries.sort_by_key(|s| (s.index_start, s.created_at));
        Ok(summaries)
    }

    async fn store_summary(&self, mut record: SummaryRecord) -> Result<String, HistoryError> {
        if record.index_start > record.index_end {
            return Err(HistoryError::Storage(format!(
                "summary interval [{}, {}] is inverted",
                record.index_start, record.index_end
            )));
        }
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&record.session_id)
            .ok_or_else(|| HistoryError::SessionNotFound(record.session_id.clone()))?;
        if session.summaries.iter().any(|s| s.id == record.id) {
            return Err(HistoryError::Storage(format!(
                "summary {} already exists",
                record.id
            )));
        }
        let id = record.id.clone();
        session.summaries.push(record);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(session_id: &str, start: usize, end: usize) -> SummaryRecord {
        SummaryRecord {
            id: String::new(),
            session_id: session_id.into(),
            index_start: start,
            index_end: end,
            content: format!("messages {start}..={end}"),
            key_data: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_and_own_session() {
        let store = InMemoryHistory::new();
        let id = store.create_session("alice").await.unwrap();
        assert_eq!(store.session_owner(&id).await.unwrap().as_deref(), Some("alice"));
        assert!(store.session_owner("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_messages_are_chronological_tail() {
        let store = InMemoryHistory::new();
        store.create_session_with_id("s1", "alice").await;
        for i in 0..5 {
            store
                .append_message("s1", Message::user(format!("m{i}")))
                .await
                .unwrap();
        }
        let recent = store.recent_messages("s1", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(store.recent_messages("s1", 50).await.unwrap().len(), 5);
        assert_eq!(store.all_messages("s1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn missing_session_errors() {
        let store = InMemoryHistory::new();
        assert!(matches!(
            store.append_message("nope", Message::user("x")).await,
            Err(HistoryError::SessionNotFound(_))
        ));
        assert!(store.recent_messages("nope", 5).await.is_err());
        assert!(store.summaries("nope").await.is_err());
    }

    #[tokio::test]
    async fn summaries_sorted_by_start() {
        let store = InMemoryHistory::new();
        store.create_session_with_id("s1", "alice").await;
        store.store_summary(summary("s1", 31, 40)).await.unwrap();
        let id = store.store_summary(summary("s1", 0, 30)).await.unwrap();
        assert!(!id.is_empty());

        let summaries = store.summaries("s1").await.unwrap();
        assert_eq!(summaries[0].index_start, 0);
        assert_eq!(summaries[1].index_start, 31);
    }

    #[tokio::test]
    async fn summaries_are_append_only() {
        let store = InMemoryHistory::new();
        store.create_session_with_id("s1", "alice").await;
        let mut record = summary("s1", 0, 5);
        record.id = "sum_fixed".into();
        store.store_summary(record.clone()).await.unwrap();
        assert!(store.store_summary(record).await.is_err());
    }

    #[tokio::test]
    async fn inverted_interval_rejected() {
        let store = InMemoryHistory::new();
        store.create_session_with_id("s1", "alice").await;
        assert!(store.store_summary(summary("s1", 9, 3)).await.is_err());
    }

    #[tokio::test]
    async fn create_with_existing_id_keeps_owner() {
        let store = InMemoryHistory::new();
        store.create_session_with_id("s1", "alice").await;
        store.create_session_with_id("s1", "mallory").await;
        assert_eq!(store.session_owner("s1").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(store.session_count().await, 1);
    }
}
