//! Chain construction: turns the ordered `providers` config into a
//! [`ProviderOrchestrator`].
//!
//! Disabled entries and entries whose credential cannot be resolved are
//! skipped. The resulting order is exactly the configured order.

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::orchestrator::ProviderOrchestrator;
use parley_config::{AppConfig, ProviderConfig, ProviderKind};
use parley_core::provider::Provider;
use parley_core::sanitize::MessageSanitizer;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Why an entry is or is not part of the live chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    Disabled,
    MissingKey,
}

/// One configured provider as the chain sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntryInfo {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub confidence: u8,
    pub status: EntryStatus,
}

/// Build the orchestrator from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderOrchestrator {
    let mut orchestrator = ProviderOrchestrator::new()
        .with_sanitizer(MessageSanitizer::new(config.chat.max_messages));

    for entry in &config.providers {
        if !entry.enabled {
            debug!(provider = %entry.name, "Provider disabled, skipping");
            continue;
        }
        let Some(api_key) = entry.resolve_api_key() else {
            debug!(provider = %entry.name, "No API key for provider, skipping");
            continue;
        };

        orchestrator = orchestrator.add(
            build_provider(entry, api_key),
            Duration::from_secs(entry.timeout_secs),
            confidence(entry),
        );
    }

    info!(providers = ?orchestrator.available_providers(), "Provider chain built");
    orchestrator
}

/// Describe every configured entry, live or not (for `parley providers`).
pub fn describe_chain(config: &AppConfig) -> Vec<ChainEntryInfo> {
    config
        .providers
        .iter()
        .map(|entry| ChainEntryInfo {
            name: entry.name.clone(),
            kind: entry.kind,
            model: model(entry),
            base_url: base_url(entry),
            timeout_secs: entry.timeout_secs,
            confidence: confidence(entry),
            status: if !entry.enabled {
                EntryStatus::Disabled
            } else if entry.resolve_api_key().is_none() {
                EntryStatus::MissingKey
            } else {
                EntryStatus::Active
            },
        })
        .collect()
}

fn build_provider(entry: &ProviderConfig, api_key: String) -> Arc<dyn Provider> {
    match entry.kind {
        ProviderKind::Gemini => Arc::new(
            GeminiProvider::new(api_key)
                .with_name(&entry.name)
                .with_base_url(base_url(entry))
                .with_model(model(entry))
                .with_sampling(entry.temperature, entry.max_tokens),
        ),
        ProviderKind::OpenaiCompat => Arc::new(
            OpenAiCompatProvider::new(&entry.name, base_url(entry), api_key, model(entry))
                .with_sampling(entry.temperature, entry.max_tokens),
        ),
    }
}

fn base_url(entry: &ProviderConfig) -> String {
    entry
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&entry.name, entry.kind))
}

fn model(entry: &ProviderConfig) -> String {
    entry
        .model
        .clone()
        .unwrap_or_else(|| default_model(&entry.name, entry.kind).into())
}

fn confidence(entry: &ProviderConfig) -> u8 {
    entry
        .confidence
        .unwrap_or_else(|| default_confidence(&entry.name))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str, kind: ProviderKind) -> String {
    if kind == ProviderKind::Gemini {
        return crate::gemini::DEFAULT_BASE_URL.into();
    }
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "xai" => "https://api.x.ai/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

fn default_model(provider_name: &str, kind: ProviderKind) -> &'static str {
    if kind == ProviderKind::Gemini {
        return crate::gemini::DEFAULT_MODEL;
    }
    match provider_name {
        "groq" => "llama-3.3-70b-versatile",
        "xai" => "grok-2-latest",
        "deepseek" => "deepseek-chat",
        "ollama" => "llama3.1",
        _ => "gpt-4o-mini",
    }
}

/// Static trust ranking: xAI answers are ranked slightly lower.
fn default_confidence(provider_name: &str) -> u8 {
    match provider_name {
        "xai" => 90,
        _ => 95,
    }
}
