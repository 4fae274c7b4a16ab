//! The chat request handler.
//!
//! One turn runs: identity checks, the rate gate, sanitization, (with a
//! session) ownership verification, persistence and context assembly, the
//! provider chain, and finally (with a session) reply persistence plus the
//! background summarization trigger. Only auth, ownership, rate limit and
//! invalid-request errors reach the caller; everything else degrades.

use crate::classify::is_business_related;
use crate::context::{ContextAssembler, ContextKind, DEFAULT_LAST_N, DEFAULT_TOKEN_BUDGET};
use crate::fallback::{FALLBACK_CONFIDENCE, FALLBACK_PROVIDER, synthesize_reply};
use crate::summarize::{SummarizationPolicy, SummarizationTrigger, TriggerOutcome};
use parley_config::AppConfig;
use parley_core::error::{Error, Result};
use parley_core::history::HistoryStore;
use parley_core::message::{Message, RawMessage, Role};
use parley_core::sanitize::{DEFAULT_MAX_MESSAGES, MessageSanitizer};
use parley_core::summary::SummarizationService;
use parley_providers::ProviderOrchestrator;
use parley_security::{Limiter, RateLimiter, rate_key};
use parley_telemetry::TelemetryEngine;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Rate limit route for chat turns.
pub const CHAT_ROUTE: &str = "ai-chat";

/// Knobs for a [`ChatHandler`], normally taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub rate_capacity: f64,
    pub rate_refill_per_sec: f64,
    pub last_n: usize,
    pub token_budget: usize,
    pub enforce_budget: bool,
    pub persist_user_messages: bool,
    pub max_messages: usize,
    pub default_role: String,
    pub summarization: SummarizationPolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            rate_capacity: 10.0,
            rate_refill_per_sec: 0.2,
            last_n: DEFAULT_LAST_N,
            token_budget: DEFAULT_TOKEN_BUDGET,
            enforce_budget: false,
            persist_user_messages: true,
            max_messages: DEFAULT_MAX_MESSAGES,
            default_role: "business_advisor".into(),
            summarization: SummarizationPolicy::default(),
        }
    }
}

impl From<&AppConfig> for ChatSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            rate_capacity: config.rate_limit.capacity,
            rate_refill_per_sec: config.rate_limit.refill_per_sec,
            last_n: config.context.last_n,
            token_budget: config.context.token_budget,
            enforce_budget: config.context.enforce_budget,
            persist_user_messages: config.chat.persist_user_messages,
            max_messages: config.chat.max_messages,
            default_role: config.chat.default_role.clone(),
            summarization: SummarizationPolicy::from(&config.summarization),
        }
    }
}

/// One inbound chat turn, already authenticated.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    /// Authenticated identity; empty means unauthenticated
    pub identity: String,
    pub client_addr: Option<String>,
    pub messages: Vec<RawMessage>,
    pub active_role: Option<String>,
    pub session_id: Option<String>,
    /// Identity the client claims to act for; must match `identity`
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub content: String,
    pub provider: String,
    pub confidence: u8,
    pub is_business_related: bool,
    pub active_role: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<ContextKind>,
}

pub struct ChatHandler {
    orchestrator: Arc<ProviderOrchestrator>,
    history: Arc<dyn HistoryStore>,
    limiter: Arc<dyn Limiter>,
    assembler: ContextAssembler,
    trigger: SummarizationTrigger,
    sanitizer: MessageSanitizer,
    settings: ChatSettings,
    telemetry: Option<Arc<TelemetryEngine>>,
}

impl ChatHandler {
    pub fn new(
        orchestrator: Arc<ProviderOrchestrator>,
        history: Arc<dyn HistoryStore>,
        summarizer: Arc<dyn SummarizationService>,
        settings: ChatSettings,
    ) -> Self {
        let sanitizer = MessageSanitizer::new(settings.max_messages);
        Self {
            assembler: ContextAssembler::new(Arc::clone(&history))
                .with_sanitizer(sanitizer)
                .with_enforced_budget(settings.enforce_budget),
            trigger: SummarizationTrigger::new(
                Arc::clone(&history),
                summarizer,
                settings.summarization.clone(),
            ),
            orchestrator,
            history,
            limiter: Arc::new(RateLimiter::default()),
            sanitizer,
            settings,
            telemetry: None,
        }
    }

    /// Replace the in-process bucket store (e.g. with a shared one).
    pub fn with_limiter(mut self, limiter: Arc<dyn Limiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.trigger = self.trigger.with_telemetry(Arc::clone(&telemetry));
        self.telemetry = Some(telemetry);
        self
    }

    pub fn orchestrator(&self) -> &Arc<ProviderOrchestrator> {
        &self.orchestrator
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Answer one turn. The summarization task, if any, is left running.
    pub async fn handle(&self, turn: ChatTurn) -> Result<ChatReply> {
        self.handle_supervised(turn).await.map(|(reply, _)| reply)
    }

    /// Like [`handle`](Self::handle), also returning the spawned
    /// summarization task so the caller can await it.
    pub async fn handle_supervised(
        &self,
        turn: ChatTurn,
    ) -> Result<(ChatReply, Option<JoinHandle<TriggerOutcome>>)> {
        let identity = turn.identity.trim().to_string();
        if identity.is_empty() {
            return Err(Error::AuthRequired);
        }

        let session_id = turn
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(user_id) = turn.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty())
            && user_id != identity
        {
            return Err(Error::OwnershipViolation {
                session_id: session_id.clone().unwrap_or_default(),
                reason: "userId does not match the authenticated identity".into(),
            });
        }

        let key = rate_key(
            CHAT_ROUTE,
            &identity,
            turn.client_addr.as_deref().unwrap_or_default(),
        );
        let decision = self
            .limiter
            .check_and_consume(
                &key,
                self.settings.rate_capacity,
                self.settings.rate_refill_per_sec,
            )
            .await;
        if !decision.allowed {
            warn!(key = %key, retry_after_ms = decision.retry_after_ms, "Rate limit exceeded");
            return Err(Error::RateLimited {
                retry_after_ms: decision.retry_after_ms,
            });
        }

        let messages = self.sanitizer.sanitize_raw(turn.messages);
        let Some(last) = messages.last() else {
            return Err(Error::InvalidRequest(
                "messages must contain at least one non-empty message".into(),
            ));
        };
        let business_related = is_business_related(&last.content);
        let active_role = turn
            .active_role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(self.settings.default_role.as_str())
            .to_string();

        info!(
            identity = %identity,
            session_id = session_id.as_deref().unwrap_or("-"),
            messages = messages.len(),
            business_related,
            active_role = %active_role,
            "Chat turn received"
        );

        let (provider_messages, context_kind) = match &session_id {
            Some(sid) => {
                self.verify_owner(sid, &identity).await?;
                let (messages, kind) = self.session_context(sid, &messages).await;
                (messages, Some(kind))
            }
            None => (messages.clone(), None),
        };

        let mut reply = match self
            .orchestrator
            .get_response(provider_messages, business_related, &active_role)
            .await
        {
            Ok(result) => ChatReply {
                content: result.content,
                provider: result.provider,
                confidence: result.confidence,
                is_business_related: business_related,
                active_role: active_role.clone(),
                fallback_mode: false,
                session_id: None,
                context_kind: None,
            },
            Err(e) => {
                warn!(error = %e, "Provider chain exhausted, synthesizing fallback reply");
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_fallback();
                }
                ChatReply {
                    content: synthesize_reply(&active_role, &messages, business_related),
                    provider: FALLBACK_PROVIDER.into(),
                    confidence: FALLBACK_CONFIDENCE,
                    is_business_related: business_related,
                    active_role: active_role.clone(),
                    fallback_mode: true,
                    session_id: None,
                    context_kind: None,
                }
            }
        };

        let mut summarization = None;
        if let Some(sid) = session_id {
            summarization = self.after_reply(&sid, &reply, &active_role).await;
            reply.session_id = Some(sid);
            reply.context_kind = context_kind;
        }

        Ok((reply, summarization))
    }

    async fn verify_owner(&self, session_id: &str, identity: &str) -> Result<()> {
        let violation = |reason: String| Error::OwnershipViolation {
            session_id: session_id.to_string(),
            reason,
        };
        match self.history.session_owner(session_id).await {
            Ok(Some(owner)) if owner == identity => Ok(()),
            Ok(Some(_)) => Err(violation("session belongs to another user".into())),
            Ok(None) => Err(violation("session not found".into())),
            Err(e) => {
                warn!(session_id, error = %e, "Ownership check failed");
                Err(violation("ownership could not be verified".into()))
            }
        }
    }

    /// Persist the latest user message, then assemble the provider context.
    async fn session_context(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> (Vec<Message>, ContextKind) {
        let latest_user = messages.last().filter(|m| m.role == Role::User);

        let mut persisted = false;
        if let Some(latest) = latest_user
            && self.settings.persist_user_messages
        {
            match self.history.append_message(session_id, latest.clone()).await {
                Ok(()) => persisted = true,
                Err(e) => warn!(session_id, error = %e, "Failed to persist user message"),
            }
        }

        let mut context = self
            .assembler
            .assemble(
                session_id,
                messages,
                self.settings.last_n,
                self.settings.token_budget,
            )
            .await;

        // Stored history lacks the question when it was not persisted.
        if let Some(latest) = latest_user
            && !persisted
            && context.kind != ContextKind::FallbackRaw
            && context.messages.last() != Some(latest)
        {
            context.messages.push(latest.clone());
        }

        (context.messages, context.kind)
    }

    /// Persist the reply and hand the full history to the trigger.
    async fn after_reply(
        &self,
        session_id: &str,
        reply: &ChatReply,
        active_role: &str,
    ) -> Option<JoinHandle<TriggerOutcome>> {
        let stored = Message::assistant(reply.content.clone()).with_role_context(active_role);
        if let Err(e) = self.history.append_message(session_id, stored).await {
            warn!(session_id, error = %e, "Failed to persist assistant reply");
        }

        match self.history.all_messages(session_id).await {
            Ok(all) => self.trigger.maybe_trigger(session_id, all),
            Err(e) => {
                warn!(session_id, error = %e, "Could not load history for summarization");
                None
            }
        }
    }
}
