//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{DashboardError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub fleet: FleetConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry WebSocket configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

/// Fleet state configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FleetConfig {
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    #[serde(default = "default_legacy_entity_id")]
    pub legacy_entity_id: String,

    #[serde(default = "default_retain_departed_history")]
    pub retain_departed_history: bool,
}

/// Telemetry recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily-rotated log file; console only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

// Default value functions
fn default_url() -> String { "ws://localhost:8000/api/telemetry/ws".to_string() }
fn default_reconnect_interval_ms() -> u64 { 1000 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_status_interval_ms() -> u64 { 5000 }

fn default_history_len() -> usize { crate::fleet::HISTORY_CAPACITY }
fn default_legacy_entity_id() -> String { "default".to_string() }
fn default_retain_departed_history() -> bool { true }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
            legacy_entity_id: default_legacy_entity_id(),
            retain_departed_history: default_retain_departed_history(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_dir: None,
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> DashboardError {
    DashboardError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use drone_dashboard::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Link
        if !(self.link.url.starts_with("ws://") || self.link.url.starts_with("wss://")) {
            return Err(invalid("link url must start with ws:// or wss://"));
        }

        if self.link.reconnect_interval_ms == 0 || self.link.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.link.connect_timeout_ms == 0 || self.link.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.link.status_interval_ms == 0 || self.link.status_interval_ms > 600000 {
            return Err(invalid("status_interval_ms must be between 1 and 600000"));
        }

        // Fleet
        if self.fleet.history_len == 0 || self.fleet.history_len > 1000 {
            return Err(invalid("history_len must be between 1 and 1000"));
        }

        if self.fleet.legacy_entity_id.is_empty() {
            return Err(invalid("legacy_entity_id cannot be empty"));
        }

        // Recorder
        if self.recorder.enabled && self.recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when enabled"));
        }

        if self.recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.recorder.format != "jsonl" {
            return Err(invalid("recorder format must be 'jsonl' (only supported format)"));
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        if matches!(&self.logging.file_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging file_dir cannot be empty when set"));
        }

        Ok(())
    }
}
