//! HTTP API gateway for Parley.
//!
//! Exposes the health check and the authenticated v1 API (chat turns,
//! sessions, summaries, provider chain and usage).
//!
//! Built on Axum.

pub mod api;
pub mod auth;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, middleware, response::Json, routing::get};
use parley_chat::{ChatHandler, ChatSettings, summarizer_from_config};
use parley_config::AppConfig;
use parley_core::history::HistoryStore;
use parley_core::summary::SummarizationService;
use parley_providers::build_from_config;
use parley_security::RateLimiter;
use parley_telemetry::TelemetryEngine;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// Request body limit for every route.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub chat: Arc<ChatHandler>,
    pub history: Arc<dyn HistoryStore>,
    pub summarizer: Arc<dyn SummarizationService>,
    pub telemetry: Arc<TelemetryEngine>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Wire every subsystem from configuration. Built once and shared.
    pub async fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let history = parley_memory::open_from_config(&config.history).await?;
        let telemetry = Arc::new(TelemetryEngine::new());

        let orchestrator = Arc::new(build_from_config(&config).with_telemetry(Arc::clone(&telemetry)));
        if orchestrator.is_empty() {
            warn!("No provider has an API key; every reply will be synthesized locally");
        }

        let summarizer = summarizer_from_config(
            &config.summarization,
            Arc::clone(&orchestrator),
            Arc::clone(&history),
        );
        let chat = ChatHandler::new(
            orchestrator,
            Arc::clone(&history),
            Arc::clone(&summarizer),
            ChatSettings::from(&config),
        )
        .with_limiter(Arc::new(RateLimiter::new(config.rate_limit.max_buckets)))
        .with_telemetry(Arc::clone(&telemetry));

        Ok(Self {
            config,
            chat: Arc::new(chat),
            history,
            summarizer,
            telemetry,
        })
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS restricted to `gateway.cors_origins`
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let v1 = api::v1_router(Arc::clone(&state)).layer(middleware::from_fn_with_state(
        Arc::clone(&state),
        auth::auth_middleware,
    ));

    let origins: Vec<HeaderValue> = state
        .config
        .gateway
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    if config.gateway.api_tokens.is_empty() && !config.gateway.allow_anonymous {
        warn!("No API tokens configured and anonymous access is off; /v1 will reject every request");
    }

    let state = Arc::new(GatewayState::from_config(config).await?);
    info!(
        providers = ?state.chat.orchestrator().available_providers(),
        history = state.history.name(),
        summarizer = state.summarizer.name(),
        "Gateway state ready"
    );

    let app = build_router(state);
    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
