//! OAuth callback handling.
//!
//! After a provider redirect, mint the token pair, persist it into the
//! session, and attempt delivery to any socket already joined to the
//! session's room. The persist is awaited **before** any emit: the emit
//! and a concurrently-arriving socket connection both read the same
//! persisted session, so emitting first could let the connection handler
//! observe a stale record and reject the client.

use axum::{
    extract::{Query, State},
    response::Redirect,
    Extension,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use vitrine_protocol::{
    PendingNotification, PendingNotificationData, ServerEvent, UserSnapshot,
};

use crate::error::GatewayError;
use crate::providers;
use crate::registry::SocketRegistry;
use crate::session_layer::SessionContext;
use crate::session_store::unix_now_millis;
use crate::state::AppState;
use crate::tokens::TokenPair;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// `GET /api/auth/google` — redirect to Google's consent screen.
pub async fn google_login(State(state): State<AppState>) -> Redirect {
    Redirect::to(&providers::google_authorize_url(&state))
}

/// `GET /api/auth/azure` — redirect to the Azure AD v2 consent screen.
pub async fn azure_login(State(state): State<AppState>) -> Redirect {
    Redirect::to(&providers::azure_authorize_url(&state))
}

/// `GET /api/auth/google/callback`
pub async fn google_callback(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    callback("google", state, session, query).await
}

/// `GET /api/auth/azure/callback`
pub async fn azure_callback(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    callback("azure", state, session, query).await
}

async fn callback(
    provider: &'static str,
    state: AppState,
    session: SessionContext,
    query: CallbackQuery,
) -> Redirect {
    let frontend = state.config.frontend_url.clone();

    let code = match (query.code, query.error) {
        (Some(code), _) => code,
        (None, error) => {
            warn!(
                component = "oauth",
                event = "oauth.callback_denied",
                provider,
                error = ?error,
                "Provider redirect carried no authorization code"
            );
            return Redirect::to(&format!("{frontend}/login?error=auth_failed"));
        }
    };

    let resolved = match provider {
        "azure" => providers::resolve_azure_user(&state, &code).await,
        _ => providers::resolve_google_user(&state, &code).await,
    };
    let user = match resolved {
        Ok(resolved) => resolved.into_snapshot(provider),
        Err(e) => {
            warn!(
                component = "oauth",
                event = "oauth.resolve_failed",
                provider,
                error = %e,
                "Identity provider resolution failed"
            );
            return Redirect::to(&format!("{frontend}/login?error=auth_failed"));
        }
    };

    match complete_login(&state, &session.id, user).await {
        Ok(pair) => {
            info!(
                component = "oauth",
                event = "oauth.callback_completed",
                provider,
                session_id = %session.id,
                "OAuth callback completed"
            );
            Redirect::to(&format!(
                "{frontend}/?token={}&refreshToken={}&auth=success",
                pair.token, pair.refresh_token
            ))
        }
        Err(e) => {
            error!(
                component = "oauth",
                event = "oauth.callback_failed",
                provider,
                session_id = %session.id,
                error = %e,
                "OAuth callback failed after user resolution"
            );
            Redirect::to(&format!("{frontend}/login?error=callback_error"))
        }
    }
}

/// Persist the authenticated user into the session and attempt delivery.
///
/// Sequencing: (1) write `user`/token pair plus the pending envelope and
/// await the store's ack, (2) best-effort direct emit to the session room,
/// (3) if the emit reached a live connection, consume the envelope so the
/// next socket to connect doesn't re-adopt and duplicate the event.
pub(crate) async fn complete_login(
    state: &AppState,
    session_id: &str,
    user: UserSnapshot,
) -> Result<TokenPair, GatewayError> {
    let pair = state.tokens.mint_pair(&user)?;
    let timestamp = unix_now_millis();

    // Held through the envelope cleanup: a socket adopting concurrently
    // must not interleave with this read-modify-write and persist a stale
    // token pair over the one minted here.
    let _guard = state.store.lock(session_id).await;

    let mut record = state.store.get(session_id).await?.unwrap_or_default();
    record.user = Some(user.clone());
    record.token = Some(pair.token.clone());
    record.refresh_token = Some(pair.refresh_token.clone());
    record.pending_socket_notification = Some(PendingNotification {
        kind: PendingNotification::AUTH_SUCCESS.to_string(),
        data: PendingNotificationData {
            user: Some(user.clone()),
            token: Some(pair.token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
            timestamp,
        },
    });
    state.store.save(session_id, &record).await?;

    // Best-effort push for a socket that was already open and waiting.
    let delivered = match SocketRegistry::instance() {
        Ok(registry) => {
            registry
                .emit_to_session(
                    session_id,
                    ServerEvent::UserConnected {
                        user,
                        token: pair.token.clone(),
                        refresh_token: pair.refresh_token.clone(),
                        socket_id: None,
                        timestamp,
                    },
                )
                .await
        }
        Err(e) => {
            warn!(
                component = "oauth",
                event = "oauth.emit_skipped",
                session_id = %session_id,
                error = %e,
                "Socket registry unavailable, relying on pending envelope"
            );
            0
        }
    };

    if delivered > 0 {
        // The direct emit reached a live connection; drop the envelope so
        // it is not adopted a second time. Best-effort: a failure here
        // leaves a harmless duplicate, not a broken login.
        record.pending_socket_notification = None;
        if let Err(e) = state.store.save(session_id, &record).await {
            warn!(
                component = "oauth",
                event = "oauth.envelope_cleanup_failed",
                session_id = %session_id,
                error = %e,
                "Failed to clear delivered envelope"
            );
        }
    }

    Ok(pair)
}
