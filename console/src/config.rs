use std::path::PathBuf;
use std::time::Duration;

use crate::bus::RetryPolicy;
use crate::context::UiState;

#[derive(Debug, Clone)]
pub struct Config {
    /// Dashboard page URL; the WebSocket and snapshot endpoints are derived from it
    pub page_url: String,
    /// JSON file standing in for browser local storage
    pub state_path: PathBuf,
    /// Delay between network tree cycles
    pub tree_poll_interval: Duration,
    /// Wait between reconnect attempts
    pub retry_delay: Duration,
    /// Give up after this many failed connects in a row; `None` never gives up
    pub retry_max_attempts: Option<u32>,
    /// Chart window sent with period-scoped requests
    pub graph_period: String,
    /// Hide node labels in rendered views
    pub redact: bool,
    /// Samples kept per rolling series
    pub history_len: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            page_url: env_str("SHAPER_CONSOLE_URL", "http://127.0.0.1:9123/"),
            state_path: PathBuf::from(env_str(
                "SHAPER_CONSOLE_STATE",
                "data/shaper-console.json",
            )),
            tree_poll_interval: Duration::from_millis(env_parse(
                "SHAPER_CONSOLE_TREE_POLL_MS",
                1000,
            )?),
            retry_delay: Duration::from_millis(env_parse("SHAPER_CONSOLE_RETRY_DELAY_MS", 2000)?),
            retry_max_attempts: env_parse_opt("SHAPER_CONSOLE_RETRY_MAX_ATTEMPTS")?,
            graph_period: env_str("SHAPER_CONSOLE_GRAPH_PERIOD", "5m"),
            redact: env_parse("SHAPER_CONSOLE_REDACT", false)?,
            history_len: env_parse("SHAPER_CONSOLE_HISTORY", 300)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: self.retry_delay,
            max_attempts: self.retry_max_attempts,
        }
    }

    pub fn ui_state(&self) -> UiState {
        UiState {
            graph_period: self.graph_period.clone(),
            redact: self.redact,
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    Ok(env_parse_opt(key)?.unwrap_or(default))
}

fn env_parse_opt<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(None),
    }
}
