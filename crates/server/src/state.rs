//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::cookie::CookieCodec;
use crate::registry::SocketRegistry;
use crate::session_store::SessionStore;
use crate::tokens::TokenMinter;

/// Cheap-to-clone handle threaded through every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SessionStore>,
    pub registry: Arc<SocketRegistry>,
    pub cookies: Arc<CookieCodec>,
    pub tokens: Arc<TokenMinter>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Config,
        store: SessionStore,
        registry: Arc<SocketRegistry>,
        cookies: CookieCodec,
    ) -> Self {
        let tokens = TokenMinter::new(&config.jwt_secret, &config.refresh_secret);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            registry,
            cookies: Arc::new(cookies),
            tokens: Arc::new(tokens),
            http: reqwest::Client::new(),
        }
    }
}
