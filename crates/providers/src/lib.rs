//! LLM Provider implementations for Parley.
//!
//! All adapters implement the `parley_core::Provider` trait. The
//! orchestrator walks them in configured order; the router builds that
//! order from configuration.

pub mod gemini;
pub mod openai_compat;
pub mod orchestrator;
pub mod prompt;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use orchestrator::ProviderOrchestrator;
pub use router::{ChainEntryInfo, EntryStatus, build_from_config, describe_chain};
