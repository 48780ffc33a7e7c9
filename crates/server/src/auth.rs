//! HTTP auth surface — logout and current-user.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use tracing::{error, info, warn};

use vitrine_protocol::ServerEvent;

use crate::registry::SocketRegistry;
use crate::session_layer::SessionContext;
use crate::state::AppState;

/// `POST /api/auth/logout` — destroy the session, clear the cookie, and
/// tell any socket on this session that it is logged out.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    if let Err(e) = state.store.destroy(&session.id).await {
        error!(
            component = "auth",
            event = "auth.logout_failed",
            session_id = %session.id,
            error = %e,
            "Failed to destroy session"
        );
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": "logout failed"})),
        )
            .into_response();
    }

    match SocketRegistry::instance() {
        Ok(registry) => {
            registry
                .emit_to_session(&session.id, ServerEvent::UserLogout)
                .await;
        }
        Err(e) => {
            warn!(
                component = "auth",
                event = "auth.logout_emit_skipped",
                session_id = %session.id,
                error = %e,
                "Socket registry unavailable during logout"
            );
        }
    }

    info!(
        component = "auth",
        event = "auth.logged_out",
        session_id = %session.id,
        "Session destroyed"
    );

    (
        [(SET_COOKIE, state.cookies.clear_header())],
        Json(json!({"success": true, "message": "Logout successful"})),
    )
        .into_response()
}

/// `GET /api/auth/me` — the session's user and token pair, 401 when the
/// session is not authenticated.
pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    let record = match state.store.get(&session.id).await {
        Ok(record) => record.unwrap_or_default(),
        Err(e) => {
            error!(
                component = "auth",
                event = "auth.me_read_failed",
                session_id = %session.id,
                error = %e,
                "Session read failed"
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": "session read failed"})),
            )
                .into_response();
        }
    };

    match record.user {
        Some(user) => Json(json!({
            "success": true,
            "user": user,
            "token": record.token,
            "refreshToken": record.refresh_token,
        }))
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "User not found"})),
        )
            .into_response(),
    }
}
