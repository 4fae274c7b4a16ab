//! Summarization delegated to an external HTTP service.
//!
//! The request body is the [`SummarizeRequest`] JSON; the service answers
//! with a [`SummarizeOutcome`] and is responsible for storing the summary.

use async_trait::async_trait;
use parley_core::error::SummarizationError;
use parley_core::summary::{SummarizationService, SummarizeOutcome, SummarizeRequest};
use std::time::Duration;
use tracing::{debug, warn};

pub struct RemoteSummarizer {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteSummarizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SummarizationService for RemoteSummarizer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn summarize(
        &self,
        request: SummarizeRequest,
    ) -> Result<SummarizeOutcome, SummarizationError> {
        request.validate()?;
        debug!(
            endpoint = %self.endpoint,
            session_id = %request.session_id,
            messages = request.old_messages.len(),
            "Posting summarization request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizationError::Service(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SummarizationError::Service(e.to_string()))?;

        if !(200..300).contains(&status) {
            warn!(status, body = %body, "Summarization service rejected request");
            return Err(SummarizationError::Rejected {
                status_code: status,
                message: body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| SummarizationError::Service(format!("Unparsable service response: {e}")))
    }
}
