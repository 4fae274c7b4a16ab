//! Chat turn orchestration for Parley.
//!
//! Ties the rate gate, sanitizer, context assembler, provider chain and
//! summarization trigger together behind [`ChatHandler`].

pub mod classify;
pub mod context;
pub mod fallback;
pub mod handler;
pub mod summarize;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::is_business_related;
pub use context::{AssembledContext, ContextAssembler, ContextKind, ContextMetadata, estimate_tokens};
pub use fallback::{FALLBACK_CONFIDENCE, FALLBACK_PROVIDER, synthesize_reply};
pub use handler::{CHAT_ROUTE, ChatHandler, ChatReply, ChatSettings, ChatTurn};
pub use summarize::{
    LlmSummarizer, RemoteSummarizer, SummarizationPolicy, SummarizationTrigger, TriggerOutcome,
    summarizer_from_config,
};
