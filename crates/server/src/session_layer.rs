//! HTTP session middleware.
//!
//! Resolves the signed session cookie into a `SessionContext` extension for
//! every API request; a request without a valid cookie gets a fresh session
//! id and the response gains a `Set-Cookie`. Applied to the HTTP API routes
//! only — the WebSocket route reads the cookie itself and must never
//! auto-create a session (a socket without a cookie has to observe
//! `no_session`).

use axum::{
    body::Body,
    extract::State,
    http::{header::SET_COOKIE, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::state::AppState;

/// The resolved session for the current request.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: String,
    /// True when this request minted the session (no valid cookie came in).
    pub is_new: bool,
}

pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let existing = state.cookies.session_id_from_headers(req.headers());
    let (session_id, is_new) = match existing {
        Some(id) => (id, false),
        None => (vitrine_protocol::new_id(), true),
    };

    if is_new {
        debug!(
            component = "session",
            event = "session.minted",
            session_id = %session_id,
            path = %req.uri().path(),
            "Minted new session id for request"
        );
    }

    req.extensions_mut().insert(SessionContext {
        id: session_id.clone(),
        is_new,
    });

    let mut response = next.run(req).await;

    if is_new {
        if let Ok(value) = HeaderValue::from_str(&state.cookies.set_header(&session_id)) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    response
}
