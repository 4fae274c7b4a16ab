//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat backend.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM vendor, history store, summarizer) is a
//! trait here. Implementations live in their respective crates, so tests can
//! swap in mocks and configuration can pick backends.

pub mod error;
pub mod history;
pub mod message;
pub mod provider;
pub mod sanitize;
pub mod summary;

// Re-export key types at crate root for ergonomics
pub use error::{Error, HistoryError, ProviderError, Result, SummarizationError};
pub use history::{HistoryStore, SummaryRecord};
pub use message::{KEY_DATA_METADATA, Message, RawMessage, Role};
pub use provider::{Provider, ProviderReply, ProviderRequest, ProviderResult};
pub use sanitize::{DEFAULT_MAX_MESSAGES, MessageSanitizer};
pub use summary::{SummarizationService, SummarizeOutcome, SummarizeRequest};
