//! Error taxonomy for the gateway.
//!
//! Connection-lifecycle errors are handled inside the WebSocket handler
//! (rejection event + close) and never propagate out of it. OAuth callback
//! errors surface to the browser as an error-query redirect.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No session record exists for the connection at all.
    #[error("no session record for this connection")]
    NoSession,

    /// A session exists but carries no user and no adoptable pending
    /// notification.
    #[error("session {session_id} has no authenticated user")]
    UnauthenticatedSession {
        session_id: String,
        session_keys: Vec<String>,
    },

    /// The session store failed to read or persist a record.
    #[error("session store failure: {0}")]
    SessionPersistence(String),

    /// The socket registry was used before `SocketRegistry::initialize`.
    /// A programming error, not recoverable at runtime.
    #[error("socket registry used before initialization")]
    UninitializedRegistry,

    /// Identity provider code exchange or profile fetch failed.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// Token minting or verification failed.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::SessionPersistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::SessionPersistence(format!("store task panicked: {err}"))
    }
}
