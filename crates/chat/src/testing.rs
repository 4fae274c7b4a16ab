//! Mock collaborators shared by this crate's tests.

use async_trait::async_trait;
use parley_core::error::{HistoryError, ProviderError, SummarizationError};
use parley_core::history::{HistoryStore, SummaryRecord};
use parley_core::message::Message;
use parley_core::provider::{Provider, ProviderReply, ProviderRequest};
use parley_core::summary::{SummarizationService, SummarizeOutcome, SummarizeRequest};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A mock provider that always fails.
pub struct FailingProvider {
    name: String,
    error: ProviderError,
    call_count: Mutex<usize>,
}

impl FailingProvider {
    pub fn new(name: &str, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
            call_count: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: &ProviderRequest) -> Result<ProviderReply, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        Err(self.error.clone())
    }
}

/// A mock provider that always answers with fixed content and keeps the
/// last request it saw.
pub struct SuccessProvider {
    name: String,
    content: String,
    call_count: Mutex<usize>,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl SuccessProvider {
    pub fn new(name: &str, content: &str) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            call_count: Mutex::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SuccessProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderReply, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(ProviderReply {
            content: self.content.clone(),
        })
    }
}

/// A history store whose every call fails.
pub struct FailingHistory;

fn unavailable() -> HistoryError {
    HistoryError::Storage("database unavailable".into())
}

#[async_trait]
impl HistoryStore for FailingHistory {
    fn name(&self) -> &str {
        "failing"
    }

    async fn create_session(&self, _owner: &str) -> Result<String, HistoryError> {
        Err(unavailable())
    }

    async fn session_owner(&self, _session_id: &str) -> Result<Option<String>, HistoryError> {
        Err(unavailable())
    }

    async fn append_message(&self, _session_id: &str, _message: Message) -> Result<(), HistoryError> {
        Err(unavailable())
    }

    async fn recent_messages(
        &self,
        _session_id: &str,
        _last_n: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        Err(unavailable())
    }

    async fn all_messages(&self, _session_id: &str) -> Result<Vec<Message>, HistoryError> {
        Err(unavailable())
    }

    async fn summaries(&self, _session_id: &str) -> Result<Vec<SummaryRecord>, HistoryError> {
        Err(unavailable())
    }

    async fn store_summary(&self, _record: SummaryRecord) -> Result<String, HistoryError> {
        Err(unavailable())
    }
}

/// Records every request; optionally waits on a gate before answering.
#[derive(Default)]
pub struct RecordingSummarizer {
    requests: Mutex<Vec<SummarizeRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
    fail: bool,
}

impl RecordingSummarizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Block every call until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<SummarizeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummarizationService for RecordingSummarizer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn summarize(
        &self,
        request: SummarizeRequest,
    ) -> Result<SummarizeOutcome, SummarizationError> {
        self.requests.lock().unwrap().push(request);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(SummarizationError::Service("model overloaded".into()));
        }
        Ok(SummarizeOutcome {
            summary_id: "sum_test".into(),
            ai_success: true,
            error: None,
        })
    }
}
