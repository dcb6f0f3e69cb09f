//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::audit::TracingAuditSink;
use crate::auth::{CookieSettings, SameSite};
use crate::db::{DEFAULT_HASH_COST, Database};
use crate::jwt::{DEFAULT_AUDIENCE, DEFAULT_ISSUER, JwtConfig};
use crate::rate_limit::RateLimitSettings;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;
const MAX_ACCESS_TTL_MINUTES: u64 = 365 * 24 * 60;
const MAX_REFRESH_TTL_DAYS: u64 = 3650;

pub const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
pub const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Auraflow",
    about = "Session service with access/refresh token rotation"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "AURAFLOW_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, env = "AURAFLOW_DATABASE", default_value = "auraflow.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the ACCESS_TOKEN_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_TOKEN_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in minutes (at most one year)
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u64).range(1..=MAX_ACCESS_TTL_MINUTES))]
    pub access_ttl_minutes: u64,

    /// Refresh token and session lifetime in days (at most ten years)
    #[arg(long, default_value = "7", value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_TTL_DAYS))]
    pub refresh_ttl_days: u64,

    /// Seconds between expired-session sweeps
    #[arg(long, default_value = "3600", value_parser = clap::value_parser!(u64).range(1..))]
    pub cleanup_interval_secs: u64,

    /// SameSite attribute for auth cookies
    #[arg(long, default_value = "strict")]
    pub same_site: SameSite,

    /// Production mode: auth cookies get the Secure flag (requires HTTPS)
    #[arg(long)]
    pub production: bool,

    /// Token issuer claim
    #[arg(long, default_value = DEFAULT_ISSUER)]
    pub issuer: String,

    /// Token audience claim
    #[arg(long, default_value = DEFAULT_AUDIENCE)]
    pub audience: String,

    /// bcrypt cost for password and refresh token hashes
    #[arg(long, default_value_t = DEFAULT_HASH_COST, value_parser = validate_hash_cost)]
    pub hash_cost: u32,

    /// Clock-skew tolerance in seconds for token expiry
    #[arg(long, default_value = "0")]
    pub leeway_secs: u64,

    /// Disable new user signups
    #[arg(long)]
    pub no_signup: bool,

    /// Key rate limits on the X-Forwarded-For header (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_hash_cost(s: &str) -> Result<u32, String> {
    let cost: u32 = s
        .parse()
        .map_err(|_| format!("Hash cost must be a number: {}", s))?;
    if !(DEFAULT_HASH_COST..=31).contains(&cost) {
        return Err(format!(
            "Hash cost must be between {} and 31: {}",
            DEFAULT_HASH_COST, cost
        ));
    }
    Ok(cost)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
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
            env = %env_var,
            "Secret is required. Set the environment variable (recommended) or use the secret file option"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            env = %env_var,
            "Secret is shorter than {} characters. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Check settings that only make sense together.
/// Returns None and logs an error if validation fails.
pub fn validate_settings(args: &Args, access_secret: &str, refresh_secret: &str) -> Option<()> {
    if access_secret == refresh_secret {
        error!("Access and refresh token secrets must differ");
        return None;
    }

    if args.same_site == SameSite::None && !args.production {
        error!("SameSite=None requires Secure cookies; use --production");
        return None;
    }

    Some(())
}

/// Cookie attributes implied by the arguments.
pub fn cookie_settings(args: &Args) -> CookieSettings {
    CookieSettings {
        secure: args.production,
        same_site: args.same_site,
        ..CookieSettings::default()
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> ServerConfig {
    let jwt = JwtConfig::new(access_secret.as_bytes(), refresh_secret.as_bytes())
        .with_scope(&args.issuer, &args.audience)
        .with_ttls(
            Duration::from_secs(args.access_ttl_minutes.saturating_mul(60)),
            Duration::from_secs(args.refresh_ttl_days.saturating_mul(24 * 60 * 60)),
        )
        .with_leeway(args.leeway_secs);

    ServerConfig {
        db: db.with_hash_cost(args.hash_cost),
        jwt,
        cookies: cookie_settings(args),
        no_signup: args.no_signup,
        trust_forwarded_for: args.trust_forwarded_for,
        rate_limits: RateLimitSettings::default(),
        audit: Arc::new(TracingAuditSink),
        cleanup_interval: Duration::from_secs(args.cleanup_interval_secs),
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
