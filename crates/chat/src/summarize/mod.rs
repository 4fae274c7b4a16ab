//! Background summarization: the trigger and the services it dispatches to.

pub mod remote;
pub mod service;
pub mod trigger;

pub use remote::RemoteSummarizer;
pub use service::{LlmSummarizer, parse_summary};
pub use trigger::{
    DEFAULT_KEEP_LAST_N, DEFAULT_THRESHOLD, SummarizationPolicy, SummarizationTrigger,
    TriggerOutcome, candidate_interval,
};

use parley_config::SummarizationConfig;
use parley_core::history::HistoryStore;
use parley_core::summary::SummarizationService;
use parley_providers::ProviderOrchestrator;
use std::sync::Arc;
use std::time::Duration;

/// The remote service when `summarization.endpoint` is set, otherwise the
/// local provider chain.
pub fn summarizer_from_config(
    config: &SummarizationConfig,
    orchestrator: Arc<ProviderOrchestrator>,
    history: Arc<dyn HistoryStore>,
) -> Arc<dyn SummarizationService> {
    match config.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(endpoint) => Arc::new(RemoteSummarizer::new(
            endpoint,
            Duration::from_secs(config.timeout_secs),
        )),
        None => Arc::new(LlmSummarizer::new(orchestrator, history)),
    }
}
