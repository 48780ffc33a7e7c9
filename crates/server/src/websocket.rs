//! WebSocket handling — the connection lifecycle and its reconciliation
//! with the session store.
//!
//! Per-connection state machine:
//! `CONNECTING → AUTH_CHECK → {REJECTED | ADOPTING_PENDING | AUTHORIZED} →
//! OPEN → CLOSED`.
//!
//! The session record, not the socket, is the source of truth for "has
//! this login been observed": whichever of (OAuth callback, socket
//! connect) happens first, the client sees exactly one `user:connected`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use vitrine_protocol::{AuthDebug, AuthRequiredReason, ServerEvent, UserSnapshot};

use crate::error::GatewayError;
use crate::registry::user_room;
use crate::session::SessionRecord;
use crate::session_store::{unix_now_millis, SessionStore};
use crate::state::AppState;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Frames that can be sent through the outbound channel.
enum OutboundFrame {
    /// JSON-serialized ServerEvent
    Event(ServerEvent),
    /// Liveness probe
    Ping(Bytes),
    /// Raw pong response
    Pong(Bytes),
    /// Graceful close, sent after a rejection event
    Close,
}

/// WebSocket upgrade handler. The session cookie is read here, before the
/// upgrade, so the connection handler can run its auth check synchronously
/// at accept time.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session_id = state.cookies.session_id_from_headers(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, session_id: Option<String>) {
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        session_id = ?session_id,
        "WebSocket connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for sending frames to this client
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(100);

    // Spawn task to forward frames to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let result = match frame {
                OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            connection_id = conn_id,
                            error = %e,
                            "Failed to serialize server event"
                        );
                        continue;
                    }
                },
                OutboundFrame::Ping(data) => ws_tx.send(Message::Ping(data)).await,
                OutboundFrame::Pong(data) => ws_tx.send(Message::Pong(data)).await,
                OutboundFrame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "WebSocket send failed, client disconnected"
                );
                break;
            }
        }
    });

    // AUTH_CHECK: read the session, adopt a pending envelope if one is
    // waiting, or reject.
    let authorized = match authorize_connection(&state.store, session_id.as_deref()).await {
        Ok(authorized) => authorized,
        Err(rejection) => {
            let (reason, debug) = match rejection {
                GatewayError::UnauthenticatedSession {
                    session_id,
                    session_keys,
                } => {
                    warn!(
                        component = "websocket",
                        event = "ws.auth.rejected",
                        connection_id = conn_id,
                        session_id = %session_id,
                        session_keys = ?session_keys,
                        "Connection rejected: session has no user"
                    );
                    (
                        AuthRequiredReason::NoUserInSession,
                        Some(AuthDebug {
                            session_id,
                            session_keys,
                        }),
                    )
                }
                _ => (AuthRequiredReason::NoSession, None),
            };

            // Exactly one auth:required, then a forced close — a rejected
            // connection never silently hangs.
            let _ = outbound_tx
                .send(OutboundFrame::Event(ServerEvent::AuthRequired {
                    reason,
                    debug,
                }))
                .await;
            let _ = outbound_tx.send(OutboundFrame::Close).await;
            // The send task exits after writing the close frame; waiting on
            // it guarantees the rejection event was flushed first.
            let _ = send_task.await;

            info!(
                component = "websocket",
                event = "ws.connection.closed",
                connection_id = conn_id,
                reason = "server-forced",
                "WebSocket connection closed"
            );
            return;
        }
    };

    // AUTHORIZED → OPEN: join the session room and the user room, then
    // notify this connection only.
    let session_room = authorized.session_id.clone();
    let user_room_key = user_room(&authorized.user.id);

    let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(100);
    state.registry.join(&session_room, conn_id, event_tx.clone());
    state.registry.join(&user_room_key, conn_id, event_tx);
    spawn_room_forwarder(event_rx, outbound_tx.clone());

    info!(
        component = "websocket",
        event = "ws.auth.authorized",
        connection_id = conn_id,
        session_id = %session_room,
        user_id = %authorized.user.id,
        adopted_pending = authorized.adopted_pending,
        "Socket connection authorized"
    );

    let _ = outbound_tx
        .send(OutboundFrame::Event(ServerEvent::UserConnected {
            user: authorized.user,
            token: authorized.token,
            refresh_token: authorized.refresh_token,
            socket_id: Some(conn_id.to_string()),
            timestamp: unix_now_millis(),
        }))
        .await;

    // OPEN: pump frames until the transport drops or the peer stops
    // answering liveness probes.
    let mut ping_interval = tokio::time::interval(state.config.ping_interval());
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping_interval.tick().await; // first tick fires immediately
    let ping_timeout = state.config.ping_timeout();
    let mut last_seen = Instant::now();

    let disconnect_reason = loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    last_seen = Instant::now();
                    let _ = outbound_tx.send(OutboundFrame::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Close(_))) => break "client namespace disconnect",
                Some(Ok(_)) => {
                    // Inbound app messages are not part of this contract.
                    last_seen = Instant::now();
                }
                Some(Err(e)) => {
                    warn!(
                        component = "websocket",
                        event = "ws.connection.error",
                        connection_id = conn_id,
                        error = %e,
                        "WebSocket error"
                    );
                    break "transport error";
                }
                None => break "transport close",
            },
            _ = ping_interval.tick() => {
                if last_seen.elapsed() >= ping_timeout {
                    break "ping timeout";
                }
                let _ = outbound_tx.send(OutboundFrame::Ping(Bytes::new())).await;
            }
        }
    };

    // OPEN → CLOSED: no persisted state changes, only membership release.
    state.registry.leave(&session_room, conn_id);
    state.registry.leave(&user_room_key, conn_id);

    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        session_id = %session_room,
        reason = disconnect_reason,
        "WebSocket connection closed"
    );
    send_task.abort();
}

/// Forward room-targeted events into this connection's outbound channel.
/// Exits when either side closes — the registry sender is dropped on
/// `leave`, the outbound channel on disconnect.
fn spawn_room_forwarder(
    mut event_rx: mpsc::Receiver<ServerEvent>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
) {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if outbound_tx.send(OutboundFrame::Event(event)).await.is_err() {
                break;
            }
        }
    });
}

/// A connection that passed the auth check.
#[derive(Debug)]
pub(crate) struct Authorized {
    pub session_id: String,
    pub user: UserSnapshot,
    pub token: String,
    pub refresh_token: String,
    /// True when this connection consumed a pending envelope.
    pub adopted_pending: bool,
}

/// What the pure session evaluation decided.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Evaluation {
    /// `session.user` was already populated.
    AlreadyAuthorized,
    /// A pending envelope was adopted into the record; persist it.
    AdoptedPending,
    /// No user and nothing adoptable.
    NoUser,
}

/// The AUTH_CHECK decision over a session record, side-effect free.
///
/// Adoption mutates `record` in place: envelope data is copied into the
/// top-level fields and the envelope is removed, so persisting the record
/// afterwards consumes it at-most-once. An envelope without a user is not
/// adoptable and is left untouched.
pub(crate) fn evaluate_session(record: &mut SessionRecord) -> Evaluation {
    if record.user.is_some() {
        return Evaluation::AlreadyAuthorized;
    }

    // This models the race where the OAuth callback completed before any
    // socket had connected to receive the direct emit.
    match record.pending_socket_notification.take() {
        Some(pending) if pending.data.user.is_some() => {
            record.user = pending.data.user;
            record.token = pending.data.token;
            record.refresh_token = pending.data.refresh_token;
            Evaluation::AdoptedPending
        }
        other => {
            record.pending_socket_notification = other;
            Evaluation::NoUser
        }
    }
}

/// Run the AUTH_CHECK against the store: read the session, adopt a pending
/// envelope if one is waiting (persisting the consumption in the same
/// step), and produce the authorization outcome.
///
/// Store failures are folded into a `NoSession` rejection after logging:
/// an auth-check error must close the connection with a diagnostic event,
/// never crash the handler.
pub(crate) async fn authorize_connection(
    store: &SessionStore,
    session_id: Option<&str>,
) -> Result<Authorized, GatewayError> {
    let Some(session_id) = session_id else {
        return Err(GatewayError::NoSession);
    };

    // Held through the adoption save: two connections racing on the same
    // session must not both observe (and consume) the pending envelope.
    let _guard = store.lock(session_id).await;

    let mut record = match store.get(session_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(GatewayError::NoSession),
        Err(e) => {
            error!(
                component = "websocket",
                event = "ws.auth.store_read_failed",
                session_id = %session_id,
                error = %e,
                "Session read failed during auth check"
            );
            return Err(GatewayError::NoSession);
        }
    };

    let evaluation = evaluate_session(&mut record);
    let adopted_pending = evaluation == Evaluation::AdoptedPending;

    if adopted_pending {
        // Persist the consumption so a second connection against this
        // session sees `user` populated and skips straight to AUTHORIZED.
        if let Err(e) = store.save(session_id, &record).await {
            warn!(
                component = "websocket",
                event = "ws.auth.adoption_save_failed",
                session_id = %session_id,
                error = %e,
                "Failed to persist adopted session, continuing authorized"
            );
        } else {
            info!(
                component = "websocket",
                event = "ws.auth.pending_adopted",
                session_id = %session_id,
                "Adopted pending notification into session"
            );
        }
    }

    match record.user {
        Some(user) => Ok(Authorized {
            session_id: session_id.to_string(),
            user,
            token: record.token.unwrap_or_default(),
            refresh_token: record.refresh_token.unwrap_or_default(),
            adopted_pending,
        }),
        None => Err(GatewayError::UnauthenticatedSession {
            session_id: session_id.to_string(),
            session_keys: record.field_names(),
        }),
    }
}
