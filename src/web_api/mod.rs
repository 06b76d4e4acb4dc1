//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Control Panel routes (queue mutations, pause, stats)
//! - Display device routes (fetch, claim, consume, heartbeat)
//! - Realtime WebSocket bridge
//! - Response formatting

mod realtime_ws;
mod routes;

pub use realtime_ws::{ClientMessage, ServerMessage};
pub use routes::create_router;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use crate::control_panel::Caller;
use crate::models::HealthResponse;
use crate::state::AppState;

/// Header carrying the authenticated user id (set by the fronting auth proxy)
pub const USER_ID_HEADER: &str = "x-user-id";
/// Comma separated role list
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Resolve the caller from auth proxy headers
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous");
    let roles: Vec<&str> = headers
        .get(USER_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(str::trim).filter(|r| !r.is_empty()).collect())
        .unwrap_or_default();
    Caller::new(user_id, &roles)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_connected = match &state.pool {
        Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
        None => true,
    };

    let response = HealthResponse {
        status: if db_connected { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        db_connected,
        realtime_subscribers: state.realtime.subscriber_count(),
        local_displays: state.displays.read().await.len(),
    };

    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-42"));
        headers.insert(USER_ROLES_HEADER, HeaderValue::from_static("viewer, moderator"));

        let caller = caller_from_headers(&headers);
        assert_eq!(caller.user_id, "u-42");
        assert!(caller.has_role("moderator"));
        assert!(!caller.has_role("admin"));
    }

    #[test]
    fn test_caller_defaults_to_anonymous() {
        let caller = caller_from_headers(&HeaderMap::new());
        assert_eq!(caller.user_id, "anonymous");
        assert!(caller.roles.is_empty());
    }
}
