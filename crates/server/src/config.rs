//! Server configuration — CLI flags with env fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "vitrine", about = "Vitrine realtime auth gateway")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "VITRINE_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Data directory (sessions db, logs, cookie key).
    #[arg(long, env = "VITRINE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Frontend origin, used for CORS and post-login redirects.
    #[arg(long, env = "VITRINE_FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: String,

    /// Session cookie name.
    #[arg(long, env = "VITRINE_COOKIE_NAME", default_value = "vitrine.sid")]
    pub cookie_name: String,

    /// Mark the session cookie `Secure`. Off in development (plain http).
    #[arg(long, env = "VITRINE_COOKIE_SECURE", default_value_t = false)]
    pub cookie_secure: bool,

    /// Sliding session expiry, in hours.
    #[arg(long, env = "VITRINE_SESSION_TTL_HOURS", default_value_t = 24)]
    pub session_ttl_hours: u64,

    /// Liveness probe interval for WebSocket connections, in seconds.
    #[arg(long, env = "VITRINE_PING_INTERVAL_SECS", default_value_t = 25)]
    pub ping_interval_secs: u64,

    /// Idle connection reaping timeout, in seconds.
    #[arg(long, env = "VITRINE_PING_TIMEOUT_SECS", default_value_t = 60)]
    pub ping_timeout_secs: u64,

    /// Secret for access token signing.
    #[arg(long, env = "VITRINE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Secret for refresh token signing.
    #[arg(long, env = "VITRINE_REFRESH_SECRET", hide_env_values = true)]
    pub refresh_secret: String,

    #[arg(long, env = "GOOGLE_CLIENT_ID", default_value = "")]
    pub google_client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true, default_value = "")]
    pub google_client_secret: String,

    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URI",
        default_value = "http://localhost:8000/api/auth/google/callback"
    )]
    pub google_redirect_uri: String,

    #[arg(long, env = "AZURE_CLIENT_ID", default_value = "")]
    pub azure_client_id: String,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true, default_value = "")]
    pub azure_client_secret: String,

    #[arg(long, env = "AZURE_TENANT_ID", default_value = "common")]
    pub azure_tenant_id: String,

    #[arg(
        long,
        env = "AZURE_REDIRECT_URI",
        default_value = "http://localhost:8000/api/auth/azure/callback"
    )]
    pub azure_redirect_uri: String,
}

impl Config {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}
