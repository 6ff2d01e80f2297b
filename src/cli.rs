//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::TokenSettings;
use crate::password::HashCost;
use crate::rate_limit::RateLimitConfig;
use crate::service::AuthConfig;
use crate::session::{MemorySessionStore, SessionBackend};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Where session records live.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStoreKind {
    /// Process-local map; sessions are lost on restart
    #[default]
    Memory,
    /// Rows in the main SQLite database
    Sqlite,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Palisade", about = "Password login with server-tracked JWT sessions")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "PALISADE_DATABASE", default_value = "palisade.db")]
    pub database: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Session record store
    #[arg(long, default_value = "memory")]
    pub session_store: SessionStoreKind,

    /// Path to file containing the access token secret. Prefer using ACCESS_SECRET env var instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer using REFRESH_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in hours
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..))]
    pub access_ttl_hours: u64,

    /// Refresh token lifetime in hours
    #[arg(long, default_value = "48", value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_ttl_hours: u64,

    /// Session idle timeout in minutes, extended on every authenticated request
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub idle_ttl_minutes: u64,

    /// Timeout for each store call in milliseconds
    #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u64).range(1..))]
    pub store_timeout_ms: u64,

    /// Argon2id memory cost in KiB
    #[arg(long, default_value = "19456")]
    pub hash_memory_kib: u32,

    /// Argon2id iteration count
    #[arg(long, default_value = "2")]
    pub hash_iterations: u32,

    /// Set the Secure flag on token cookies (enable when served over HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Take the client IP for rate limiting from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Client ID mixed into secrets of externally authenticated accounts
    #[arg(long, env = "EXTERNAL_CLIENT_ID")]
    pub external_client_id: Option<String>,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<Vec<u8>> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env_var,
            "Secret is required. Set the environment variable (recommended) or use the secret file flag"
        );
        return None;
    };

    Some(secret.into_bytes())
}

/// Check that both secrets are long enough and not the same.
pub fn validate_secrets(access: &[u8], refresh: &[u8]) -> Result<(), String> {
    if access.len() < MIN_SECRET_LENGTH || refresh.len() < MIN_SECRET_LENGTH {
        return Err(format!(
            "Secrets must be at least {} bytes. Use longer secrets",
            MIN_SECRET_LENGTH
        ));
    }
    if access == refresh {
        return Err("Access and refresh secrets must differ".to_string());
    }
    Ok(())
}

/// Load and validate both token secrets.
/// Returns None and logs an error if either is missing or invalid.
pub fn load_token_settings(args: &Args) -> Option<TokenSettings> {
    let access = load_secret("ACCESS_SECRET", args.access_secret_file.as_deref())?;
    let refresh = load_secret("REFRESH_SECRET", args.refresh_secret_file.as_deref())?;

    if let Err(e) = validate_secrets(&access, &refresh) {
        error!("{}", e);
        return None;
    }

    let mut settings = TokenSettings::new(&access, &refresh);
    settings.access_lifetime = Duration::from_secs(args.access_ttl_hours * 60 * 60);
    settings.refresh_lifetime = Duration::from_secs(args.refresh_ttl_hours * 60 * 60);
    Some(settings)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, tokens: TokenSettings) -> ServerConfig {
    let sessions = match args.session_store {
        SessionStoreKind::Memory => SessionBackend::Memory(MemorySessionStore::new()),
        SessionStoreKind::Sqlite => SessionBackend::Sqlite(db.sessions()),
    };

    let auth = AuthConfig {
        tokens,
        hash_cost: HashCost {
            memory_kib: args.hash_memory_kib,
            iterations: args.hash_iterations,
            ..HashCost::default()
        },
        session_idle_ttl: Duration::from_secs(args.idle_ttl_minutes * 60),
        store_timeout: Duration::from_millis(args.store_timeout_ms),
        external_client_id: args.external_client_id.clone(),
    };

    ServerConfig {
        db,
        sessions,
        auth,
        secure_cookies: args.secure_cookies,
        rate_limits: RateLimitConfig::new(args.trust_forwarded_for),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
