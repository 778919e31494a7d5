use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub rust_log: String,
    /// Unfiltered session listings only return sessions started within this window.
    pub session_lookback_days: i64,
    pub backfill_page_size: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub manifest_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            session_lookback_days: parse_env("SESSION_LOOKBACK_DAYS", 30)?,
            backfill_page_size: parse_env("BACKFILL_PAGE_SIZE", 200)?,
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_ms: parse_env("RETRY_BASE_DELAY_MS", 250)?,
            manifest_path: std::env::var("MANIFEST_PATH").ok(),
        })
    }

    pub fn session_lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_lookback_days)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for Config {
    /// Defaults for an in-process setup; `database_url` is left empty.
    fn default() -> Self {
        Config {
            database_url: String::new(),
            db_max_connections: 10,
            rust_log: "info".to_string(),
            session_lookback_days: 30,
            backfill_page_size: 200,
            retry_max_attempts: 3,
            retry_base_delay_ms: 250,
            manifest_path: None,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid value, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
