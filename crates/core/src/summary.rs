//! Summarization service contract.

use crate::error::SummarizationError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A cluster of old raw messages to compress into one [`crate::SummaryRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub session_id: String,
    pub old_messages: Vec<Message>,
    pub index_start: usize,
    pub index_end: usize,
}

impl SummarizeRequest {
    /// Shape checks shared by every service implementation.
    pub fn validate(&self) -> std::result::Result<(), SummarizationError> {
        if self.session_id.trim().is_empty() {
            return Err(SummarizationError::InvalidRequest(
                "sessionId is required".into(),
            ));
        }
        if self.old_messages.is_empty() {
            return Err(SummarizationError::InvalidRequest(
                "oldMessages must not be empty".into(),
            ));
        }
        if self.index_start > self.index_end {
            return Err(SummarizationError::InvalidRequest(format!(
                "indexStart {} is after indexEnd {}",
                self.index_start, self.index_end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeOutcome {
    pub summary_id: String,

    /// `false` when the stored summary is an extractive fallback
    pub ai_success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compresses a message cluster and stores the resulting summary.
#[async_trait]
pub trait SummarizationService: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(
        &self,
        request: SummarizeRequest,
    ) -> std::result::Result<SummarizeOutcome, SummarizationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: usize, end: usize) -> SummarizeRequest {
        SummarizeRequest {
            session_id: "s1".into(),
            old_messages: vec![Message::user("hi")],
            index_start: start,
            index_end: end,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request(0, 30).validate().is_ok());
        assert!(request(5, 5).validate().is_ok());
    }

    #[test]
    fn inverted_interval_rejected() {
        let err = request(10, 3).validate().unwrap_err();
        assert!(matches!(err, SummarizationError::InvalidRequest(_)));
    }

    #[test]
    fn empty_cluster_rejected() {
        let mut req = request(0, 1);
        req.old_messages.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn outcome_wire_shape() {
        let outcome = SummarizeOutcome {
            summary_id: "sum_1".into(),
            ai_success: false,
            error: Some("all providers failed".into()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["summaryId"], "sum_1");
        assert_eq!(json["aiSuccess"], false);
    }
}
