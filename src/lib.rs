pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod rate_limit;
pub mod service;
pub mod session;

use api::create_api_router;
use auth::AuthState;
use axum::Router;
use db::Database;
use password::PasswordError;
use rate_limit::RateLimitConfig;
use service::{AuthConfig, AuthService};
use session::SessionBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Store holding the session records
    pub sessions: SessionBackend,
    /// Secrets, lifetimes, hashing cost and timeouts for the auth service
    pub auth: AuthConfig,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Per-IP limits on the unauthenticated auth endpoints
    pub rate_limits: RateLimitConfig,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, PasswordError> {
    let service = AuthService::new(config.db.users(), config.sessions.clone(), &config.auth)?;
    let state = AuthState::new(service, config.secure_cookies);

    let api_router = create_api_router(state, Arc::new(config.rate_limits.clone()));

    Ok(Router::new().nest("/api", api_router))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(sessions: &SessionBackend) {
    cleanup::run_cleanup(sessions).await;
    cleanup::spawn_cleanup_scheduler(sessions.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.sessions).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
