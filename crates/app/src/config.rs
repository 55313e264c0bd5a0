//! Application configuration loaded from environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use domain::{DispatcherConfig, RetryPolicy};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// A variable that was set but could not be parsed. Its default was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSetting {
    pub key: &'static str,
    pub value: String,
}

impl fmt::Display for InvalidSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.key, self.value)
    }
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset keeps events in memory
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `STORE_TIMEOUT_MS`: limit on each event store call (default: `5000`)
/// - `PUBLISH_TIMEOUT_MS`: limit on each publish (default: `2000`)
/// - `SNAPSHOT_EVERY`: snapshot interval in events; unset or `0` disables snapshots
/// - `RETRY_MAX_ATTEMPTS`: attempts per command on a write conflict (default: `3`)
/// - `RETRY_BASE_DELAY_MS`: first backoff delay (default: `20`)
/// - `METRICS_ADDR`: bind address of the Prometheus listener; unset disables it
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_timeout: Duration,
    pub publish_timeout: Duration,
    pub snapshot_every: Option<u64>,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub metrics_addr: Option<SocketAddr>,

    /// Settings that were ignored. Logged once telemetry is up.
    pub invalid: Vec<InvalidSetting>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = Reader {
            lookup,
            invalid: Vec::new(),
        };
        let defaults = Self::default();

        let log_level = reader.raw("RUST_LOG").unwrap_or(defaults.log_level);
        let log_format = reader.parsed("LOG_FORMAT").unwrap_or(defaults.log_format);
        let database_url = reader.raw("DATABASE_URL");
        let database_max_connections = reader
            .parsed("DATABASE_MAX_CONNECTIONS")
            .unwrap_or(defaults.database_max_connections);
        let store_timeout = reader
            .parsed("STORE_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_timeout);
        let publish_timeout = reader
            .parsed("PUBLISH_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.publish_timeout);
        let snapshot_every = reader
            .parsed::<u64>("SNAPSHOT_EVERY")
            .filter(|every| *every > 0);
        let retry_max_attempts = reader
            .parsed("RETRY_MAX_ATTEMPTS")
            .unwrap_or(defaults.retry_max_attempts);
        let retry_base_delay = reader
            .parsed("RETRY_BASE_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay);
        let metrics_addr = reader.parsed("METRICS_ADDR");

        Self {
            log_level,
            log_format,
            database_url,
            database_max_connections,
            store_timeout,
            publish_timeout,
            snapshot_every,
            retry_max_attempts,
            retry_base_delay,
            metrics_addr,
            invalid: reader.invalid,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            store_timeout: self.store_timeout,
            publish_timeout: self.publish_timeout,
            snapshot_every: self.snapshot_every,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_base_delay)
    }
}

impl Default for Config {
    fn default() -> Self {
        let dispatcher = DispatcherConfig::default();
        let retry = RetryPolicy::default();
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            store_timeout: dispatcher.store_timeout,
            publish_timeout: dispatcher.publish_timeout,
            snapshot_every: dispatcher.snapshot_every,
            retry_max_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay,
            metrics_addr: None,
            invalid: Vec::new(),
        }
    }
}

struct Reader<F> {
    lookup: F,
    invalid: Vec<InvalidSetting>,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value of `key`, treating blank as unset.
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T: FromStr>(&mut self, key: &'static str) -> Option<T> {
        let value = self.raw(key)?;
        match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.invalid.push(InvalidSetting { key, value });
                None
            }
        }
    }
}
