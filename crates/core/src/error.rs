//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! mirrors the request-level failure taxonomy.

use thiserror::Error;

/// The top-level error type for a chat turn.
///
/// Only `AuthRequired`, `RateLimited`, `OwnershipViolation` and
/// `InvalidRequest` are surfaced to the caller as distinct failures.
/// Everything else is recovered or logged by the request handler.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Session {session_id} is not accessible: {reason}")]
    OwnershipViolation { session_id: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Persistence ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] HistoryError),

    // --- Summarization ---
    #[error("Summarization error: {0}")]
    Summarization(#[from] SummarizationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Terminal state of the fallback chain. `attempted == 0` means no
    /// provider was configured at all.
    #[error("All providers failed ({attempted} attempted): {last_error}")]
    AllProvidersFailed { attempted: usize, last_error: String },
}

#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("Invalid summarization request: {0}")]
    InvalidRequest(String),

    #[error("Summarization service failed: {0}")]
    Service(String),

    #[error("Summarization service rejected request (status {status_code}): {message}")]
    Rejected { status_code: u16, message: String },

    #[error("History error during summarization: {0}")]
    History(#[from] HistoryError),
}
