//! Rate-limited HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{debug, instrument};

use super::error::ApiError;
use crate::ratelimit::Counter;

/// Shared state for the HTTP handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The rate limit registry, shared by every request
    pub counter: Arc<Counter>,
    /// Calls per minute allowed for each client address
    pub limit_per_minute: i64,
}

impl AppState {
    pub fn new(counter: Arc<Counter>, limit_per_minute: i64) -> Self {
        Self {
            counter,
            limit_per_minute,
        }
    }
}

/// Build the router. Every path is rate limited against the caller's address.
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

/// The rate limit key for a peer: its IP address without the port.
///
/// IPv4-mapped IPv6 peers are keyed by their IPv4 address so a dual-stack
/// listener does not split one client across two buckets.
pub fn client_key(peer: &SocketAddr) -> String {
    peer.ip().to_canonical().to_string()
}

/// Charge one token to the caller's bucket and report the outcome as JSON.
#[instrument(skip_all, fields(peer = %peer, method = %method))]
async fn handle_request(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
) -> Result<Response, ApiError> {
    if method != Method::GET {
        return Ok((StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n").into_response());
    }

    let key = client_key(&peer);
    let info = state.counter.add(&key, state.limit_per_minute, 1)?;

    let status = if info.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };

    debug!(
        key = %key,
        allowed = info.allowed,
        remaining = info.remaining,
        "Rate limit decision made"
    );

    let body = serde_json::to_string_pretty(&info).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}
