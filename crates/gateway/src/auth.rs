//! Bearer token authentication and client address extraction.

use crate::SharedState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Identity used for unauthenticated callers when anonymous access is on.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: String,
}

/// Authentication middleware for the `/v1` API.
///
/// A presented token must map to an identity in `gateway.api_tokens`. With
/// no token the request proceeds as [`ANONYMOUS_IDENTITY`] only when
/// `gateway.allow_anonymous` is set.
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let identity = match token {
        Some(token) => match state.config.gateway.api_tokens.get(token) {
            Some(identity) => identity.clone(),
            None => {
                warn!("Unauthorized request to /v1 API, invalid bearer token");
                return unauthorized();
            }
        },
        None if state.config.gateway.allow_anonymous => ANONYMOUS_IDENTITY.to_string(),
        None => {
            warn!("Unauthorized request to /v1 API, missing bearer token");
            return unauthorized();
        }
    };

    req.extensions_mut().insert(Caller { identity });
    next.run(req).await
}

fn unauthorized() -> Response {
    crate::api::ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required").into_response()
}

/// Client address: first `x-forwarded-for` hop, then `x-real-ip`.
pub fn client_addr(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(client_addr(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_addr(&headers).as_deref(), Some("198.51.100.2"));
    }

    #[test]
    fn no_address_headers() {
        assert!(client_addr(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert!(client_addr(&headers).is_none());
    }
}
