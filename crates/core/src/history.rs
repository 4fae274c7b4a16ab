//! History trait: session ownership, raw messages, and summary records.
//!
//! A session's raw messages form an index space `0..len`. Summaries cover
//! closed intervals of that space and are append-only once stored.

use crate::error::HistoryError;
use crate::message::{KEY_DATA_METADATA, Message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A compressed cluster of raw messages `[index_start, index_end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub id: String,
    pub session_id: String,
    pub index_start: usize,
    pub index_end: usize,
    pub content: String,
    #[serde(default)]
    pub key_data: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SummaryRecord {
    /// Closed-interval overlap test against `[start, end]`.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.index_end >= start && end >= self.index_start
    }

    /// Project the summary into a `system` message carrying its key data.
    pub fn to_message(&self) -> Message {
        let mut message = Message::system(self.content.clone());
        if !self.key_data.is_empty() {
            message.metadata.insert(
                KEY_DATA_METADATA.into(),
                serde_json::Value::from(self.key_data.clone()),
            );
        }
        message
    }
}

/// The core HistoryStore trait.
///
/// Implementations: in-memory (tests, ephemeral), SQLite.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Create a session owned by `owner` and return its id.
    async fn create_session(&self, owner: &str) -> std::result::Result<String, HistoryError>;

    /// The identity owning a session, or `None` if the session does not exist.
    async fn session_owner(
        &self,
        session_id: &str,
    ) -> std::result::Result<Option<String>, HistoryError>;

    /// Append a raw message to the end of the session.
    async fn append_message(
        &self,
        session_id: &str,
        message: Message,
    ) -> std::result::Result<(), HistoryError>;

    /// The last `last_n` raw messages, oldest first.
    async fn recent_messages(
        &self,
        session_id: &str,
        last_n: usize,
    ) -> std::result::Result<Vec<Message>, HistoryError>;

    /// Every raw message of the session, oldest first.
    async fn all_messages(&self, session_id: &str)
    -> std::result::Result<Vec<Message>, HistoryError>;

    /// Summaries of the session ordered by `index_start`.
    async fn summaries(
        &self,
        session_id: &str,
    ) -> std::result::Result<Vec<SummaryRecord>, HistoryError>;

    /// Persist a new summary and return its id.
    async fn store_summary(&self, record: SummaryRecord)
    -> std::result::Result<String, HistoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: usize, end: usize) -> SummaryRecord {
        SummaryRecord {
            id: "sum_1".into(),
            session_id: "s1".into(),
            index_start: start,
            index_end: end,
            content: "User is launching a bakery.".into(),
            key_data: vec!["city: Pune".into()],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn identical_intervals_overlap() {
        assert!(record(0, 29).overlaps(0, 29));
    }

    #[test]
    fn adjacent_intervals_do_not_overlap() {
        assert!(!record(0, 29).overlaps(30, 59));
    }

    #[test]
    fn partial_and_contained_intervals_overlap() {
        assert!(record(0, 29).overlaps(29, 40));
        assert!(record(10, 20).overlaps(0, 30));
        assert!(record(0, 30).overlaps(5, 6));
    }

    #[test]
    fn projects_to_system_message_with_key_data() {
        let msg = record(0, 10).to_message();
        assert_eq!(msg.role, crate::message::Role::System);
        assert_eq!(msg.key_data(), vec!["city: Pune"]);
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_string(&record(0, 3)).unwrap();
        assert!(json.contains("\"indexStart\":0"));
        assert!(json.contains("\"keyData\""));
    }
}
