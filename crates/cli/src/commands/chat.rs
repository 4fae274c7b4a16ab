//! `parley chat`: answer one message through the full chat pipeline.
//!
//! Uses the configured provider chain and an in-memory history store, so a
//! `--session` only lives for this run.

use parley_chat::{ChatHandler, ChatSettings, ChatTurn, summarizer_from_config};
use parley_config::AppConfig;
use parley_core::history::HistoryStore;
use parley_core::message::RawMessage;
use parley_memory::InMemoryHistory;
use parley_providers::build_from_config;
use std::sync::Arc;

/// Identity used for local one-shot turns.
const LOCAL_IDENTITY: &str = "local";

pub async fn run(
    message: String,
    role: Option<String>,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let handler = build_handler(&config, session.as_deref()).await;

    if handler.orchestrator().is_empty() {
        eprintln!("  No provider has an API key; the reply will be synthesized locally.");
        eprintln!("  Set OPENAI_API_KEY, GEMINI_API_KEY, GROQ_API_KEY or XAI_API_KEY.");
        eprintln!();
    }

    let turn = ChatTurn {
        identity: LOCAL_IDENTITY.into(),
        messages: vec![RawMessage::new("user", message)],
        active_role: role,
        session_id: session,
        ..Default::default()
    };

    let (reply, summarization) = handler.handle_supervised(turn).await?;
    if let Some(task) = summarization {
        let _ = task.await;
    }

    println!("{}", reply.content);
    eprintln!();
    eprintln!(
        "  [{} | confidence {} | {}{}]",
        reply.provider,
        reply.confidence,
        reply.active_role,
        if reply.is_business_related {
            " | business"
        } else {
            ""
        }
    );

    Ok(())
}

/// Wire a handler over an in-memory store, pre-creating `session` for the
/// local identity when given.
pub(crate) async fn build_handler(config: &AppConfig, session: Option<&str>) -> ChatHandler {
    let memory = InMemoryHistory::new();
    if let Some(session_id) = session.map(str::trim).filter(|s| !s.is_empty()) {
        memory.create_session_with_id(session_id, LOCAL_IDENTITY).await;
    }
    let history: Arc<dyn HistoryStore> = Arc::new(memory);

    let orchestrator = Arc::new(build_from_config(config));
    let summarizer = summarizer_from_config(
        &config.summarization,
        Arc::clone(&orchestrator),
        Arc::clone(&history),
    );
    ChatHandler::new(orchestrator, history, summarizer, ChatSettings::from(config))
}
