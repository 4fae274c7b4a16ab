//! Provider trait: the abstraction over LLM vendors.
//!
//! Every vendor has its own credentials, payload shape and response shape.
//! An adapter hides all of that behind [`Provider::complete`]; the
//! orchestrator only ever sees messages in and text out.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One provider call: the assembled conversation plus routing hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    /// Sanitized, assembled conversation
    pub messages: Vec<Message>,

    /// Whether the latest user message looks business-related
    #[serde(default)]
    pub business_related: bool,

    /// The persona the user selected (e.g. "idea_validator")
    pub active_role: String,
}

impl ProviderRequest {
    /// The most recent non-blank `roleContext` in the conversation.
    pub fn role_context(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.role_context.as_deref())
    }
}

/// What an adapter hands back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub content: String,
}

/// The orchestrator's answer for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Generated text
    pub content: String,

    /// Name of the provider that produced it
    pub provider: String,

    /// Static trust score of that provider (0–100)
    pub confidence: u8,
}

/// The core Provider trait.
///
/// Implementations: OpenAI-compatible (OpenAI, Groq, xAI), Gemini.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderReply, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_context_prefers_latest() {
        let req = ProviderRequest {
            messages: vec![
                Message::user("first").with_role_context("mentor"),
                Message::assistant("reply"),
                Message::user("second").with_role_context("investor"),
            ],
            business_related: true,
            active_role: "advisor".into(),
        };
        assert_eq!(req.role_context(), Some("investor"));
    }

    #[test]
    fn role_context_absent() {
        let req = ProviderRequest {
            messages: vec![Message::user("hello")],
            business_related: false,
            active_role: "advisor".into(),
        };
        assert!(req.role_context().is_none());
    }

    #[test]
    fn provider_result_serialization() {
        let result = ProviderResult {
            content: "ok".into(),
            provider: "groq".into(),
            confidence: 95,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"provider\":\"groq\""));
        assert!(json.contains("95"));
    }
}
