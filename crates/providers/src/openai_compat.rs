//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, Groq, xAI, OpenRouter, and any endpoint exposing
//! `POST /chat/completions` with Bearer authentication.

use crate::prompt::{clean_response, content_with_key_data, system_prompt};
use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::message::{Message, Role};
use parley_core::provider::{Provider, ProviderReply, ProviderRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
///
/// This handles most vendors since they expose an OpenAI-compatible
/// `/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1024,
            client: http_client(),
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Persona system prompt followed by the conversation.
    fn to_api_messages(request: &ProviderRequest) -> Vec<ApiMessage> {
        std::iter::once(ApiMessage {
            role: "system".into(),
            content: system_prompt(request),
        })
        .chain(request.messages.iter().map(|m: &Message| ApiMessage {
            role: match m.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
                Role::System => "system".into(),
            },
            content: content_with_key_data(m),
        }))
        .collect()
    }

    fn request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        })
    }

    /// Extract and clean `choices[0].message.content`.
    fn parse_response(body: &str) -> Result<String, ProviderError> {
        let api_response: ApiResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let cleaned = clean_response(&content);
        if cleaned.is_empty() {
            return Err(ProviderError::MalformedResponse("Empty completion".into()));
        }
        Ok(cleaned)
    }
}

/// Shared HTTP client. Attempts are bounded by the orchestrator's timeout;
/// this one only guards against a misconfigured chain.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a non-success HTTP status to a provider error.
pub(crate) fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderReply, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);

        debug!(provider = %self.name, model = %self.model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            warn!(provider = %self.name, status, body = %text, "Provider returned error");
            return Err(status_error(status, text));
        }

        Ok(ProviderReply {
            content: Self::parse_response(&text)?,
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProviderRequest {
        ProviderRequest {
            messages: vec![
                Message::system("Earlier: user runs a bakery."),
                Message::user("How do I grow?"),
                Message::assistant("Start with regulars."),
            ],
            business_related: true,
            active_role: "business_advisor".into(),
        }
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let custom = OpenAiCompatProvider::new("custom", "http://localhost:8000/v1/", "k", "m");
        assert_eq!(custom.name(), "custom");
        assert_eq!(custom.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion_prepends_persona() {
        let api = OpenAiCompatProvider::to_api_messages(&request());
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert!(api[0].content.contains("The Business Advisor"));
        assert_eq!(api[1].role, "system");
        assert_eq!(api[2].role, "user");
        assert_eq!(api[3].role, "assistant");
    }

    #[test]
    fn request_body_shape() {
        let provider = OpenAiCompatProvider::new("openai", "https://api.openai.com/v1", "sk", "gpt-4o-mini").with_sampling(0.2, 256);
        let body = provider.request_body(&request());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn parse_valid_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"<think>plan</think> Grow via referrals."}}]}"#;
        assert_eq!(
            OpenAiCompatProvider::parse_response(body).unwrap(),
            "Grow via referrals."
        );
    }

    #[test]
    fn parse_malformed_responses() {
        for body in [
            "not json",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"  <think>only thoughts</think> "}}]}"#,
        ] {
            let err = OpenAiCompatProvider::parse_response(body).unwrap_err();
            assert!(
                matches!(err, ProviderError::MalformedResponse(_)),
                "{body}: {err:?}"
            );
        }
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(403, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        match status_error(503, "overloaded".into()) {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("Expected ApiError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = OpenAiCompatProvider::new("local", "http://127.0.0.1:1", "k", "m");
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
