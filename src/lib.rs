pub mod api;
pub mod audit;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod session;

use api::{AuthState, create_api_router};
use audit::AuditSink;
use auth::CookieSettings;
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use rate_limit::{RateLimitSettings, RateLimiters};
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing keys, scope and lifetimes for access and refresh tokens
    pub jwt: JwtConfig,
    /// Attributes for the auth cookies
    pub cookies: CookieSettings,
    /// Whether new user signups are disabled
    pub no_signup: bool,
    /// Key rate limits on `X-Forwarded-For` (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    pub rate_limits: RateLimitSettings,
    /// Destination for security audit events
    pub audit: Arc<dyn AuditSink>,
    /// Interval between expired-session sweeps
    pub cleanup_interval: Duration,
}

impl ServerConfig {
    /// Session manager wired to this configuration's store, keys and audit sink.
    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(
            Arc::new(self.jwt.clone()),
            self.db.sessions(),
            self.audit.clone(),
        )
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let state = AuthState {
        db: config.db.clone(),
        sessions: config.session_manager(),
        cookies: config.cookies.clone(),
        limiters: RateLimiters::new(config.rate_limits, config.trust_forwarded_for),
        no_signup: config.no_signup,
    };

    Router::new().nest("/api", create_api_router(state))
}

/// Run cleanup once and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) -> tokio::task::JoinHandle<()> {
    let sessions = config.db.sessions();
    cleanup::run_cleanup(&sessions, config.audit.as_ref()).await;
    cleanup::spawn_cleanup_scheduler(sessions, config.audit.clone(), config.cleanup_interval)
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
