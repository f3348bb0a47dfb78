//! Configuration module for the classcal application.
//!
//! Values are read from the process environment (after `.env` is loaded) via
//! figment. Durations accept either plain seconds (`3600`) or strings with a
//! unit (`"5s"`, `"100ms"`, `"1h"`).

use crate::reference::RetryPolicy;
use crate::reference::source::DEFAULT_SOURCE_URL;
use anyhow::Context;
use figment::{Figment, providers::Env};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration containing all sub-configurations
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// Log level for the application
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error"
    /// Defaults to "info" if not specified
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the web server
    #[serde(default = "default_port")]
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Page listing every classroom
    #[serde(default = "default_source_url")]
    pub source_url: String,
    /// Time between reference refreshes
    #[serde(
        default = "default_refresh_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub refresh_interval: Duration,
    /// HTTP timeout for a single fetch
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub fetch_timeout: Duration,
    #[serde(default = "default_fetch_max_attempts")]
    pub fetch_max_attempts: u32,
    #[serde(
        default = "default_fetch_retry_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub fetch_retry_delay: Duration,

    /// Pending tasks kept before the oldest unclaimed ones are evicted
    #[serde(default = "default_task_capacity")]
    pub task_capacity: usize,
    /// Finished tasks whose status and artifact are retained
    #[serde(default = "default_result_capacity")]
    pub result_capacity: usize,
    /// Number of enrichment workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Pause after every ten processed events
    #[serde(
        default = "default_pacing_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub pacing_delay: Duration,
    /// How long workers wait for the first reference table before starting anyway
    #[serde(
        default = "default_startup_wait",
        deserialize_with = "deserialize_duration"
    )]
    pub startup_wait: Duration,
    /// Directory for uploads and results; defaults to `<tmp>/classcal`
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// SQLite URL for persisting the reference table across restarts
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        figment.extract().context("Failed to load config")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch_max_attempts,
            delay: self.fetch_retry_delay,
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("classcal"))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_fetch_max_attempts() -> u32 {
    5
}

fn default_fetch_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_task_capacity() -> usize {
    100
}

fn default_result_capacity() -> usize {
    1000
}

fn default_workers() -> usize {
    2
}

fn default_pacing_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_startup_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// Accepts a number of seconds or a string such as `"5s"` or `"1h"`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(D::Error::custom),
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ]);
    let parsed = parser
        .parse(text.trim())
        .map_err(|e| format!("invalid duration {text:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {text:?}: {e}"))
}
