//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`: Answer one chat turn
//! - `POST /v1/sessions`: Create a session owned by the caller
//! - `GET  /v1/sessions/{id}/summaries`: Stored summaries (owner only)
//! - `POST /v1/summarize-history`: Summarize a message cluster (owner only)
//! - `GET  /v1/providers`: Configured provider chain
//! - `GET  /v1/usage`: Provider and summarization telemetry

use crate::SharedState;
use crate::auth::{Caller, client_addr};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use parley_chat::{ChatReply, ChatTurn};
use parley_core::error::{Error, SummarizationError};
use parley_core::history::SummaryRecord;
use parley_core::message::RawMessage;
use parley_core::summary::{SummarizeOutcome, SummarizeRequest};
use parley_providers::{ChainEntryInfo, describe_chain};
use parley_telemetry::UsageSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}/summaries", get(summaries_handler))
        .route("/summarize-history", post(summarize_handler))
        .route("/providers", get(providers_handler))
        .route("/usage", get(usage_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// An error response: status plus `{error, retryAfterMs?}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                retry_after_ms: None,
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::AuthRequired => Self::new(StatusCode::UNAUTHORIZED, e.to_string()),
            Error::RateLimited { retry_after_ms } => Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: ErrorResponse {
                    error: "Too many requests".into(),
                    retry_after_ms: Some(retry_after_ms),
                },
            },
            Error::OwnershipViolation { .. } => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            Error::InvalidRequest(_) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            other => {
                error!(error = %other, "Unhandled chat error");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self
            .body
            .retry_after_ms
            .map(|ms| ms.div_ceil(1000).to_string());
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = retry_after.and_then(|s| HeaderValue::from_str(&s).ok()) {
            response.headers_mut().insert(header::RETRY_AFTER, secs);
        }
        response
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub active_role: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(payload) = payload?;
    let turn = ChatTurn {
        identity: caller.identity,
        client_addr: client_addr(&headers),
        messages: payload.messages,
        active_role: payload.active_role,
        session_id: payload.session_id,
        user_id: payload.user_id,
    };
    let reply = state.chat.handle(turn).await?;
    Ok(Json(reply))
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

async fn create_session_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let session_id = state
        .history
        .create_session(&caller.identity)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create session");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
        })?;
    info!(identity = %caller.identity, session_id = %session_id, "Session created");
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryList {
    pub session_id: String,
    pub summaries: Vec<SummaryRecord>,
}

async fn summaries_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<String>,
) -> Result<Json<SummaryList>, ApiError> {
    ensure_owner(&state, &session_id, &caller.identity).await?;
    let summaries = state.history.summaries(&session_id).await.map_err(|e| {
        error!(session_id = %session_id, error = %e, "Failed to load summaries");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load summaries")
    })?;
    Ok(Json(SummaryList {
        session_id,
        summaries,
    }))
}

async fn summarize_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummarizeOutcome>, ApiError> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    ensure_owner(&state, &request.session_id, &caller.identity).await?;

    match state.summarizer.summarize(request).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(SummarizationError::InvalidRequest(reason)) => {
            Err(ApiError::new(StatusCode::BAD_REQUEST, reason))
        }
        Err(e @ (SummarizationError::Service(_) | SummarizationError::Rejected { .. })) => {
            warn!(error = %e, "Summarization service failed");
            Err(ApiError::new(StatusCode::BAD_GATEWAY, e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "Summarization failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Summarization failed",
            ))
        }
    }
}

async fn ensure_owner(state: &SharedState, session_id: &str, identity: &str) -> Result<(), ApiError> {
    match state.history.session_owner(session_id).await {
        Ok(Some(owner)) if owner == identity => Ok(()),
        Ok(_) => Err(ApiError::new(
            StatusCode::FORBIDDEN,
            format!("Session {session_id} is not accessible"),
        )),
        Err(e) => {
            warn!(session_id, error = %e, "Ownership check failed");
            Err(ApiError::new(
                StatusCode::FORBIDDEN,
                format!("Session {session_id} is not accessible"),
            ))
        }
    }
}

// ── Introspection ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProviderList {
    pub providers: Vec<ChainEntryInfo>,
    pub active: Vec<String>,
}

async fn providers_handler(State(state): State<SharedState>) -> Json<ProviderList> {
    Json(ProviderList {
        providers: describe_chain(&state.config),
        active: state.chat.orchestrator().available_providers(),
    })
}

async fn usage_handler(State(state): State<SharedState>) -> Json<UsageSnapshot> {
    Json(state.telemetry.snapshot())
}
