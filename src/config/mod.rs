use anyhow::{anyhow, Result};
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub push_gateway_url: String,
    pub push_gateway_token: Option<String>,
    pub push_timeout_seconds: u64,
    pub push_chunk_size: usize,
    pub receipt_chunk_size: usize,
    /// Base of the retry backoff: a failed attempt n reschedules
    /// `backoff_base^n` minutes out. Keep this in step with
    /// `stale_after_hours` — with base 4, attempt 5 lands ~17h out and
    /// attempt 6 would overshoot the default 24h window, after which the
    /// cleanup sweep purges the record instead of the retry job servicing it.
    pub retry_backoff_base: u32,
    pub retry_interval_seconds: u64,
    pub receipt_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub stale_after_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            push_gateway_url: env_or_err("PUSH_GATEWAY_URL")?,
            push_gateway_token: std::env::var("PUSH_GATEWAY_TOKEN").ok(),
            push_timeout_seconds: env_or_parse("PUSH_TIMEOUT_SECONDS", "10")?,
            push_chunk_size: env_or_parse("PUSH_CHUNK_SIZE", "100")?,
            receipt_chunk_size: env_or_parse("RECEIPT_CHUNK_SIZE", "300")?,
            retry_backoff_base: env_or_parse("RETRY_BACKOFF_BASE", "4")?,
            retry_interval_seconds: env_or_parse("RETRY_INTERVAL_SECONDS", "300")?,
            receipt_interval_seconds: env_or_parse("RECEIPT_INTERVAL_SECONDS", "30")?,
            cleanup_interval_seconds: env_or_parse("CLEANUP_INTERVAL_SECONDS", "86400")?,
            stale_after_hours: env_or_parse("STALE_AFTER_HOURS", "24")?,
        })
    }
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
