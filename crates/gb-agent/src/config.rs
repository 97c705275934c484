use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Process configuration, loaded from the environment at startup. Invalid
/// values are rejected here rather than discovered mid-run (spec.md §7,
/// Fatal/Config).
#[derive(Debug, Clone)]
pub struct Config {
    pub poll_interval: Duration,
    pub max_consecutive_errors: i32,
    pub broker_base_url: String,
    pub broker_key_id: String,
    pub broker_secret_key: String,
    pub database_url: String,
    pub db_max_conns: u32,
    pub db_min_conns: u32,
    pub log_level: String,
    pub log_format_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let poll_interval_secs: u64 = env_or("POLL_INTERVAL_SECS", "30")?;
        let max_consecutive_errors: i32 = env_or("MAX_CONSECUTIVE_ERRORS", "5")?;
        let db_max_conns: u32 = env_or("DB_MAX_CONNS", "10")?;
        let db_min_conns: u32 = env_or("DB_MIN_CONNS", "1")?;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format_json = std::env::var("RUST_LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        if poll_interval_secs == 0 {
            bail!("POLL_INTERVAL_SECS must be positive");
        }
        if max_consecutive_errors < 1 {
            bail!("MAX_CONSECUTIVE_ERRORS must be at least 1");
        }
        if db_min_conns > db_max_conns {
            bail!("DB_MIN_CONNS must not exceed DB_MAX_CONNS");
        }
        if !matches!(log_level.as_str(), "debug" | "info" | "warn" | "error") {
            bail!("LOG_LEVEL must be one of debug|info|warn|error, got '{log_level}'");
        }

        let broker_base_url = required_env("BROKER_BASE_URL")?;
        let broker_key_id = required_env("BROKER_KEY_ID")?;
        let broker_secret_key = required_env("BROKER_SECRET_KEY")?;
        let database_url = required_env("DATABASE_URL")?;

        Ok(Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_consecutive_errors,
            broker_base_url,
            broker_key_id,
            broker_secret_key,
            database_url,
            db_max_conns,
            db_min_conns,
            log_level,
            log_format_json,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {key} ('{raw}'): {e}"))
}
