use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::writer::RetryPolicy;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterConfig {
    /// Maximum events per transaction, also the event queue capacity.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per batch before the writer gives up. `0` retries forever.
    #[serde(default = "default_write_retries")]
    pub write_retries: usize,
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Growth of the delay between attempts. `1.0` keeps it constant.
    #[serde(default = "default_retry_backoff_factor")]
    pub retry_backoff_factor: f64,
    /// Ceiling for the grown delay. Values below `retry_delay_ms` are raised to it.
    #[serde(default)]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_throttle_poll_interval_ms")]
    pub throttle_poll_interval_ms: u64,
    #[serde(default)]
    pub database_rewrites: HashMap<String, String>,
    #[serde(default)]
    pub table_rewrites: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_file")]
    pub file: PathBuf,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("PG_APPLY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.host.is_empty() {
            return Err(Error::Config("target.host must not be empty".to_string()));
        }
        if self.target.database.is_empty() {
            return Err(Error::Config("target.database must not be empty".to_string()));
        }
        self.writer.validate()
    }
}

impl TargetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "writer.batch_size must be greater than zero".to_string(),
            ));
        }
        if !self.retry_backoff_factor.is_finite() || self.retry_backoff_factor < 1.0 {
            return Err(Error::Config(format!(
                "writer.retry_backoff_factor must be at least 1.0, got {}",
                self.retry_backoff_factor
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.write_retries)
            .with_delay(Duration::from_millis(self.retry_delay_ms))
            .with_backoff(
                self.retry_backoff_factor,
                Duration::from_millis(self.retry_max_delay_ms),
            )
    }

    pub fn throttle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_poll_interval_ms)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            write_retries: default_write_retries(),
            retry_delay_ms: 0,
            retry_backoff_factor: default_retry_backoff_factor(),
            retry_max_delay_ms: 0,
            throttle_poll_interval_ms: default_throttle_poll_interval_ms(),
            database_rewrites: HashMap::new(),
            table_rewrites: HashMap::new(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            file: default_checkpoint_file(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    100
}

fn default_write_retries() -> usize {
    5
}

fn default_retry_backoff_factor() -> f64 {
    1.0
}

fn default_throttle_poll_interval_ms() -> u64 {
    500
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("checkpoint.json")
}
