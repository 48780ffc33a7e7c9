//! Vitrine Server
//!
//! Realtime auth gateway for the Vitrine storefront: bridges cookie-backed
//! HTTP sessions to live WebSocket connections and reconciles OAuth
//! redirect flows with sockets that connect before or after the login
//! lands.

mod auth;
mod config;
mod cookie;
mod error;
mod logging;
mod oauth;
mod paths;
mod providers;
mod registry;
mod session;
mod session_layer;
mod session_store;
mod state;
mod tokens;
mod websocket;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::cookie::CookieCodec;
use crate::registry::SocketRegistry;
use crate::session_layer::session_middleware;
use crate::session_store::SessionStore;
use crate::state::AppState;
use crate::websocket::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    paths::init_data_dir(config.data_dir.as_deref());
    paths::ensure_dirs()?;

    let logging_handle = logging::init_logging()?;
    info!(
        component = "main",
        event = "server.starting",
        run_id = %logging_handle.run_id,
        "Starting Vitrine gateway"
    );

    cookie::ensure_key();
    let cookie_key = cookie::load_key()?;
    let cookies = CookieCodec::new(
        config.cookie_name.clone(),
        config.cookie_secure,
        config.session_ttl().as_secs(),
        &cookie_key,
    );

    let store = SessionStore::open(paths::sessions_db_path(), config.session_ttl())?;
    let registry = SocketRegistry::initialize();

    let bind = config.bind;
    let frontend_url = config.frontend_url.clone();
    let state = AppState::new(config, store, registry, cookies);
    SessionStore::spawn_janitor(Arc::clone(&state.store));

    let cors = CorsLayer::new()
        .allow_origin(frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_credentials(true)
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    let api = Router::new()
        .route("/api/auth/google", get(oauth::google_login))
        .route("/api/auth/google/callback", get(oauth::google_callback))
        .route("/api/auth/azure", get(oauth::azure_login))
        .route("/api/auth/azure/callback", get(oauth::azure_callback))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    info!(
        component = "main",
        event = "server.listening",
        addr = %bind,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
