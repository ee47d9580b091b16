use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// Base URL of the candle feed, e.g. `wss://stream.binance.com:9443`.
    pub feed_ws_base_url: String,
    pub symbol: String,
    pub interval: String,

    /// Base URL of the on-chain vault HTTP facade.
    pub vault_base_url: String,
    pub vault_status_timeout: Duration,
    pub vault_action_timeout: Duration,

    /// Shared retry policy for every execution pipeline step.
    pub max_retries: u32,
    pub base_backoff: Duration,

    pub pipeline_poll_interval: Duration,
    pub pipeline_batch_size: usize,

    /// Reconnect backoff bounds for the ingestion supervisor.
    pub ws_reconnect_initial_backoff: Duration,
    pub ws_reconnect_max_backoff: Duration,
    pub ws_ping_interval: Duration,
    pub ws_open_timeout: Duration,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("failed to parse {key}={raw:?}: {e}"))
}

fn duration_secs_env(key: &str, default_secs: u64) -> Result<Duration> {
    let secs: u64 = parse_env(key, &default_secs.to_string())?;
    Ok(Duration::from_secs(secs))
}

fn duration_millis_env(key: &str, default_millis: u64) -> Result<Duration> {
    let millis: u64 = parse_env(key, &default_millis.to_string())?;
    Ok(Duration::from_millis(millis))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://clband.db".to_string());

        let feed_ws_base_url = env::var("FEED_WS_BASE_URL")
            .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string());
        let symbol = env::var("SYMBOL").unwrap_or_else(|_| "ETHUSDT".to_string());
        let interval = env::var("INTERVAL").unwrap_or_else(|_| "1m".to_string());

        let vault_base_url = env::var("VAULT_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let vault_status_timeout = duration_secs_env("VAULT_STATUS_TIMEOUT_SECS", 10)
            .context("VAULT_STATUS_TIMEOUT_SECS")?;
        let vault_action_timeout = duration_secs_env("VAULT_ACTION_TIMEOUT_SECS", 55)
            .context("VAULT_ACTION_TIMEOUT_SECS")?;

        let max_retries: u32 = parse_env("MAX_RETRIES", "3").context("MAX_RETRIES")?;
        let base_backoff =
            duration_secs_env("BASE_BACKOFF_SEC", 2).context("BASE_BACKOFF_SEC")?;

        let pipeline_poll_interval = duration_millis_env("PIPELINE_POLL_INTERVAL_MS", 5_000)
            .context("PIPELINE_POLL_INTERVAL_MS")?;
        let pipeline_batch_size: usize =
            parse_env("PIPELINE_BATCH_SIZE", "50").context("PIPELINE_BATCH_SIZE")?;

        let ws_reconnect_initial_backoff =
            duration_secs_env("WS_RECONNECT_INITIAL_BACKOFF_SEC", 1)
                .context("WS_RECONNECT_INITIAL_BACKOFF_SEC")?;
        let ws_reconnect_max_backoff = duration_secs_env("WS_RECONNECT_MAX_BACKOFF_SEC", 30)
            .context("WS_RECONNECT_MAX_BACKOFF_SEC")?;
        let ws_ping_interval =
            duration_secs_env("WS_PING_INTERVAL_SEC", 15).context("WS_PING_INTERVAL_SEC")?;
        let ws_open_timeout =
            duration_secs_env("WS_OPEN_TIMEOUT_SEC", 30).context("WS_OPEN_TIMEOUT_SEC")?;

        Ok(Config {
            database_url,
            feed_ws_base_url,
            symbol,
            interval,
            vault_base_url,
            vault_status_timeout,
            vault_action_timeout,
            max_retries,
            base_backoff,
            pipeline_poll_interval,
            pipeline_batch_size,
            ws_reconnect_initial_backoff,
            ws_reconnect_max_backoff,
            ws_ping_interval,
            ws_open_timeout,
        })
    }

    pub fn stream_key(&self) -> String {
        format!("{}_{}", self.symbol.to_lowercase(), self.interval)
    }
}
