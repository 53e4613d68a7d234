//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::ConfigLoader;

fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub writer: WriterSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Durable store configuration. Without a path runs are kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file; `~` and `${VAR}` are expanded.
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    /// Resolved database path, if configured.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(ConfigLoader::expand_path(p)))
    }
}

/// Run execution and payload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Ceiling on a run's accumulated active time.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Longest string kept in a persisted step payload.
    #[serde(default = "default_event_max_chars")]
    pub event_max_chars: usize,

    /// Most list items kept in a persisted step payload.
    #[serde(default = "default_event_max_items")]
    pub event_max_items: usize,

    /// Longest string kept in a streamed event payload.
    #[serde(default = "default_stream_max_chars")]
    pub stream_max_chars: usize,

    /// Most list items kept in a streamed event payload.
    #[serde(default = "default_stream_max_items")]
    pub stream_max_items: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout(),
            event_max_chars: default_event_max_chars(),
            event_max_items: default_event_max_items(),
            stream_max_chars: default_stream_max_chars(),
            stream_max_items: default_stream_max_items(),
        }
    }
}

fn default_run_timeout() -> u64 {
    600
}

fn default_event_max_chars() -> usize {
    10_000
}

fn default_event_max_items() -> usize {
    50
}

fn default_stream_max_chars() -> usize {
    500
}

fn default_stream_max_items() -> usize {
    10
}

/// Persistence writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Write a daily-rolling log file in addition to the console.
    #[serde(default = "default_true")]
    pub file: bool,

    /// Log directory; defaults to `~/.flowhands/logs`.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: true,
            dir: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Resolved log directory.
    pub fn resolved_dir(&self) -> PathBuf {
        match self.dir.as_deref() {
            Some(dir) => PathBuf::from(ConfigLoader::expand_path(dir)),
            None => ConfigLoader::home_dir().join("logs"),
        }
    }
}
