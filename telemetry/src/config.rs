use std::time::Duration;

use crate::series::DEFAULT_SERIES_CAPACITY;

/// Upper bound the backend accepts for `?limit=` on the pages listing
pub const MAX_PAGES_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Base URL of the crawler API (no trailing slash)
    pub api_base: String,
    /// Samples kept per rolling series
    pub series_capacity: usize,
    /// Period of the run/pages snapshot poll
    pub poll_interval: Duration,
    /// How many recent pages each poll asks for
    pub pages_limit: usize,
    /// Initial event-stream reconnection delay; the server may change it
    pub reconnect_delay: Duration,
    /// Timeout for one-shot HTTP requests
    pub request_timeout: Duration,
    /// Consecutive 4xx answers on the event stream before giving up
    pub stream_client_error_retries: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080".to_string(),
            series_capacity: DEFAULT_SERIES_CAPACITY,
            poll_interval: Duration::from_millis(2000),
            pages_limit: 50,
            reconnect_delay: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(15),
            stream_client_error_retries: 5,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            api_base: normalize_base(&env_str("CRAWL_API_BASE", &defaults.api_base)),
            series_capacity: env_parse("CRAWL_SERIES_CAPACITY", defaults.series_capacity)?
                .max(1),
            poll_interval: Duration::from_millis(
                env_parse("CRAWL_POLL_INTERVAL_MS", 2000u64)?.max(100),
            ),
            pages_limit: env_parse("CRAWL_PAGES_LIMIT", defaults.pages_limit)?
                .clamp(1, MAX_PAGES_LIMIT),
            reconnect_delay: Duration::from_millis(env_parse("CRAWL_RECONNECT_DELAY_MS", 3000u64)?),
            request_timeout: Duration::from_secs(env_parse("CRAWL_REQUEST_TIMEOUT_SECS", 15u64)?),
            stream_client_error_retries: env_parse(
                "CRAWL_STREAM_CLIENT_ERROR_RETRIES",
                defaults.stream_client_error_retries,
            )?,
        })
    }

    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Self {
        self.api_base = normalize_base(api_base.as_ref());
        self
    }
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
