//! Provider orchestration: ordered fallback chain with per-provider timeouts.
//!
//! Messages are sanitized once, then each configured provider is tried in
//! order until one answers. Attempts are strictly sequential: a provider is
//! never raced against another and never retried within one request. When
//! every entry fails the caller gets `AllProvidersFailed` and is expected to
//! synthesize a local reply.

use parley_core::error::ProviderError;
use parley_core::message::{Message, Role};
use parley_core::provider::{Provider, ProviderRequest, ProviderResult};
use parley_core::sanitize::MessageSanitizer;
use parley_telemetry::{AttemptOutcome, ProviderAttempt, TelemetryEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timeout used by [`ProviderOrchestrator::add_default`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Confidence used by [`ProviderOrchestrator::add_default`].
pub const DEFAULT_CONFIDENCE: u8 = 95;

/// A single entry in the chain.
struct ChainEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
    confidence: u8,
}

/// Tries providers in priority order until one succeeds.
pub struct ProviderOrchestrator {
    chain: Vec<ChainEntry>,
    sanitizer: MessageSanitizer,
    telemetry: Option<Arc<TelemetryEngine>>,
}

impl Default for ProviderOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderOrchestrator {
    /// Create an orchestrator with an empty chain.
    pub fn new() -> Self {
        Self {
            chain: Vec::new(),
            sanitizer: MessageSanitizer::default(),
            telemetry: None,
        }
    }

    /// Append a provider with its own timeout and confidence score.
    ///
    /// A zero timeout is bumped to one millisecond so every attempt stays
    /// bounded and can still make progress.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration, confidence: u8) -> Self {
        let timeout = timeout.max(Duration::from_millis(1));
        self.chain.push(ChainEntry {
            provider,
            timeout,
            confidence: confidence.min(100),
        });
        self
    }

    /// Append a provider with the default timeout (30s) and confidence (95).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, DEFAULT_TIMEOUT, DEFAULT_CONFIDENCE)
    }

    pub fn with_sanitizer(mut self, sanitizer: MessageSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Provider names in the order they are attempted.
    pub fn available_providers(&self) -> Vec<String> {
        self.chain
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Answer the conversation with the first provider that succeeds.
    pub async fn get_response(
        &self,
        messages: Vec<Message>,
        business_related: bool,
        active_role: &str,
    ) -> Result<ProviderResult, ProviderError> {
        let incoming = messages.len();
        let request = ProviderRequest {
            messages: self.sanitizer.sanitize(messages),
            business_related,
            active_role: active_role.to_string(),
        };

        info!(
            providers = ?self.available_providers(),
            active_role = %active_role,
            business_related,
            incoming,
            sanitized = request.messages.len(),
            dropped = incoming - request.messages.len(),
            "Provider selection started"
        );
        log_context_breakdown(&request.messages);

        let total = self.chain.len();
        let mut last_error = ProviderError::NotConfigured("No providers in chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider_name = entry.provider.name().to_string();
            let position = i + 1;

            info!(
                provider = %provider_name,
                attempt = position,
                total,
                "Fallback: trying provider"
            );

            let started = Instant::now();
            let outcome = tokio::time::timeout(entry.timeout, entry.provider.complete(&request)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(reply)) if !reply.content.trim().is_empty() => {
                    info!(
                        provider = %provider_name,
                        latency_ms,
                        response_len = reply.content.len(),
                        confidence = entry.confidence,
                        "Provider succeeded"
                    );
                    self.record(ProviderAttempt::new(
                        &provider_name,
                        position,
                        AttemptOutcome::Succeeded,
                        latency_ms,
                    ));
                    return Ok(ProviderResult {
                        content: reply.content,
                        provider: provider_name,
                        confidence: entry.confidence,
                    });
                }
                Ok(Ok(_)) => {
                    let e = ProviderError::MalformedResponse(format!(
                        "Provider '{provider_name}' returned empty content"
                    ));
                    warn!(provider = %provider_name, latency_ms, error = %e, "Fallback: provider failed, trying next");
                    self.record(
                        ProviderAttempt::new(&provider_name, position, AttemptOutcome::Failed, latency_ms)
                            .with_error(e.to_string()),
                    );
                    last_error = e;
                }
                Ok(Err(e)) => {
                    warn!(
                        provider = %provider_name,
                        latency_ms,
                        error = %e,
                        "Fallback: provider failed, trying next"
                    );
                    self.record(
                        ProviderAttempt::new(&provider_name, position, AttemptOutcome::Failed, latency_ms)
                            .with_error(e.to_string()),
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        provider = %provider_name,
                        timeout_ms = entry.timeout.as_millis() as u64,
                        "Fallback: provider timed out, trying next"
                    );
                    let e = ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}ms",
                        provider_name,
                        entry.timeout.as_millis()
                    ));
                    self.record(
                        ProviderAttempt::new(&provider_name, position, AttemptOutcome::TimedOut, latency_ms)
                            .with_error(e.to_string()),
                    );
                    last_error = e;
                }
            }
        }

        error!(attempted = total, last_error = %last_error, "All providers failed");
        Err(ProviderError::AllProvidersFailed {
            attempted: total,
            last_error: last_error.to_string(),
        })
    }

    /// Whether at least one provider in the chain reports healthy.
    pub async fn health_check(&self) -> bool {
        for entry in &self.chain {
            if let Ok(true) = entry.provider.health_check().await {
                return true;
            }
        }
        false
    }

    fn record(&self, attempt: ProviderAttempt) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_attempt(attempt);
        }
    }
}

fn log_context_breakdown(messages: &[Message]) {
    let count = |role: Role| messages.iter().filter(|m| m.role == role).count();
    let summaries = count(Role::System);
    debug!(
        context_type = if summaries > 0 { "hybrid" } else { "raw_only" },
        summaries,
        user = count(Role::User),
        assistant = count(Role::Assistant),
        has_role_context = messages.iter().any(|m| m.role_context.is_some()),
        "Provider request context"
    );
}
