//! Configuration management for mongocursor
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cursor::{CursorOptions, PrefetchMode, PrefetchPolicy};
use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Cursor behaviour
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the collection
    #[serde(default = "default_database")]
    pub database: String,

    /// Connect and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Per-cursor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    /// `batchSize` for `find` and every `getMore`
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Maximum number of documents to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Bound on each fetch in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,

    /// `maxTimeMS` sent with each `getMore`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_await_time_ms: Option<u64>,

    /// Background fetch policy
    #[serde(default)]
    pub prefetch: PrefetchConfig,
}

/// Prefetch policy selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// always, never or remaining-below
    #[serde(default = "default_prefetch_mode")]
    pub mode: PrefetchMode,

    /// Unread items left in a batch before `remaining-below` prefetches
    #[serde(default = "default_prefetch_threshold")]
    pub threshold: usize,
}

/// Display and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Output format (json, json-pretty)
    #[serde(default = "default_format")]
    pub format: OutputFormat,

    /// Enable colored output
    #[serde(default = "default_color")]
    pub color: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// One document per line, suitable for piping
    Json,

    /// Indented multi-line documents
    JsonPretty,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "test".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_prefetch_mode() -> PrefetchMode {
    PrefetchMode::Always
}

fn default_prefetch_threshold() -> usize {
    0
}

fn default_format() -> OutputFormat {
    OutputFormat::Json
}

fn default_color() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            timeout: default_timeout(),
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            limit: None,
            timeout_ms: default_fetch_timeout_ms(),
            max_await_time_ms: None,
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            mode: default_prefetch_mode(),
            threshold: default_prefetch_threshold(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            color: default_color(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ConfigError::FileNotFound(path.display().to_string())
            }
            _ => ConfigError::InvalidFormat(format!("{}: {}", path.display(), e)),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration, falling back to defaults
    ///
    /// An explicitly given file must exist; a missing default file just
    /// means default values.
    ///
    /// # Arguments
    /// * `path` - Explicit configuration file, or `None` for the default location
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `~/.mongocursor/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongocursor")
            .join("config.toml")
    }

    /// Override values from `MONGOCURSOR_*` variables
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, if set
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("MONGOCURSOR_URI") {
            self.connection.uri = uri;
        }
        if let Some(size) = lookup("MONGOCURSOR_BATCH_SIZE") {
            self.cursor.batch_size = parse_value("MONGOCURSOR_BATCH_SIZE", &size)?;
        }
        if let Some(timeout) = lookup("MONGOCURSOR_TIMEOUT_MS") {
            self.cursor.timeout_ms = parse_value("MONGOCURSOR_TIMEOUT_MS", &timeout)?;
        }
        if let Some(level) = lookup("MONGOCURSOR_LOG_LEVEL") {
            self.logging.level = parse_value("MONGOCURSOR_LOG_LEVEL", &level)?;
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        self.connection.validate_uri()?;

        if self.connection.database.is_empty() {
            return Err(invalid("connection.database", "").into());
        }
        if self.connection.timeout == 0 {
            return Err(invalid("connection.timeout", "0").into());
        }
        if self.cursor.batch_size == 0 {
            return Err(invalid("cursor.batch_size", "0").into());
        }
        if self.cursor.limit == Some(0) {
            return Err(invalid("cursor.limit", "0").into());
        }
        if self.cursor.timeout_ms == 0 {
            return Err(invalid("cursor.timeout_ms", "0").into());
        }
        Ok(())
    }

    /// Serialize the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

impl ConnectionConfig {
    /// Check the URI scheme
    ///
    /// # Returns
    /// * `Result<()>` - Ok if URI is valid, error otherwise
    pub fn validate_uri(&self) -> Result<()> {
        if self.uri.starts_with("mongodb://") || self.uri.starts_with("mongodb+srv://") {
            Ok(())
        } else {
            Err(invalid("connection.uri", &self.uri).into())
        }
    }
}

impl CursorConfig {
    /// Build cursor options from this configuration
    ///
    /// # Arguments
    /// * `cancel` - Token that cancels the cursor's fetches
    pub fn to_options(&self, cancel: CancellationToken) -> CursorOptions {
        CursorOptions {
            batch_size: Some(self.batch_size),
            limit: self.limit,
            timeout: Some(Duration::from_millis(self.timeout_ms)),
            max_await_time: self.max_await_time_ms.map(Duration::from_millis),
            comment: None,
            cancel,
        }
    }
}

impl PrefetchConfig {
    /// Build the configured prefetch policy
    pub fn to_policy(&self) -> Box<dyn PrefetchPolicy> {
        self.mode.to_policy(self.threshold)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl OutputFormat {
    /// Check if format requires pretty printing
    pub fn is_pretty(&self) -> bool {
        matches!(self, OutputFormat::JsonPretty)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(field, value).into())
}
