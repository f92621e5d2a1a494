//! Engine configuration.
//!
//! Configuration can be loaded from:
//! 1. A TOML file (path in `LAMBDUH_CONFIG_FILE`)
//! 2. Environment variables (with `LAMBDUH_` prefix)
//!
//! Environment variables override TOML configuration. The resulting
//! [`EngineConfig`] is handed to the engine at construction; nothing reads
//! the environment after that.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! state_bucket = "deploy-state"
//! marker_extension = "lambduh.txt"
//! api_call_delay_ms = 350
//! retry_attempts = 5
//!
//! [log]
//! level = "debug"
//! json = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_CONFIG_FILE_NAME, DEFAULT_MARKER_EXTENSION, MAX_DELETE_BATCH};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Io { path: String, error: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Engine settings.
///
/// # Examples
///
/// ```
/// use lambduh::EngineConfig;
///
/// let config = EngineConfig::from_toml(r#"
///     state_bucket = "deploy-state"
///     api_call_delay_ms = 500
/// "#).unwrap();
/// assert_eq!(config.state_bucket.as_deref(), Some("deploy-state"));
/// assert_eq!(config.api_call_delay().as_millis(), 500);
/// assert_eq!(config.marker_extension, "lambduh.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bucket for continuation records and history copies. Defaults to the
    /// bucket the archive arrived in.
    pub state_bucket: Option<String>,

    /// Extension of continuation marker objects, without leading dot.
    pub marker_extension: String,

    /// Name of the deployment document at the archive root.
    pub config_file_name: String,

    /// Minimum delay after each quota-limited API call.
    pub api_call_delay_ms: u64,

    /// Attempts for transient failures inside one step, including the first.
    pub retry_attempts: u32,

    /// Fixed backoff between those attempts.
    pub retry_backoff_ms: u64,

    /// Keys per delete request during cleanup.
    pub delete_batch_size: usize,

    /// Overrides the region derived from the invocation.
    pub region: Option<String>,

    /// Overrides the account id derived from the invocation.
    pub account_id: Option<String>,

    /// Scratch directory for archive extraction.
    pub work_dir: PathBuf,

    /// Topic for failures of runs whose own topic is unknown, such as a
    /// continuation record that can no longer be loaded.
    pub error_topic_arn: Option<String>,

    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_bucket: None,
            marker_extension: DEFAULT_MARKER_EXTENSION.to_string(),
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            api_call_delay_ms: 350, // ~3 calls per second
            retry_attempts: 5,
            retry_backoff_ms: 1000,
            delete_batch_size: MAX_DELETE_BATCH,
            region: None,
            account_id: None,
            work_dir: std::env::temp_dir(),
            error_topic_arn: None,
            log: LogConfig::default(),
        }
    }
}

/// Logging settings, consumed by [`init_tracing`](crate::logging::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,

    /// Emit JSON lines instead of plain text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the optional file and the environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML file named by `LAMBDUH_CONFIG_FILE`
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("LAMBDUH_CONFIG_FILE") {
            Ok(path) => Self::from_file(path),
            Err(_) => {
                let mut config = Self::default();
                config.apply_overrides(|name| std::env::var(name).ok());
                Ok(config)
            },
        }
    }

    /// Load configuration from a specific file, then apply the environment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Strips leading dots from the marker extension, whatever its source.
    fn normalize(&mut self) {
        let trimmed = self.marker_extension.trim_start_matches('.');
        if trimmed.len() != self.marker_extension.len() {
            self.marker_extension = trimmed.to_string();
        }
    }

    /// Applies `LAMBDUH_*` overrides read through `lookup`.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LAMBDUH_STATE_BUCKET") {
            self.state_bucket = Some(v);
        }
        if let Some(v) = lookup("LAMBDUH_MARKER_EXTENSION") {
            self.marker_extension = v;
        }
        if let Some(v) = lookup("LAMBDUH_CONFIG_FILE_NAME") {
            self.config_file_name = v;
        }
        if let Some(v) = lookup("LAMBDUH_API_CALL_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.api_call_delay_ms = v;
        }
        if let Some(v) = lookup("LAMBDUH_RETRY_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retry_attempts = v;
        }
        if let Some(v) = lookup("LAMBDUH_RETRY_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.retry_backoff_ms = v;
        }
        if let Some(v) = lookup("LAMBDUH_DELETE_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.delete_batch_size = v;
        }
        if let Some(v) = lookup("LAMBDUH_REGION") {
            self.region = Some(v);
        }
        if let Some(v) = lookup("LAMBDUH_ACCOUNT_ID") {
            self.account_id = Some(v);
        }
        if let Some(v) = lookup("LAMBDUH_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LAMBDUH_ERROR_TOPIC_ARN") {
            self.error_topic_arn = Some(v);
        }
        if let Some(v) = lookup("LAMBDUH_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("LAMBDUH_LOG_JSON").and_then(|v| v.parse().ok()) {
            self.log.json = v;
        }
        self.normalize();
    }

    pub fn api_call_delay(&self) -> Duration {
        Duration::from_millis(self.api_call_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Delete batch size clamped to the provider limit.
    pub fn delete_batch(&self) -> usize {
        self.delete_batch_size.clamp(1, MAX_DELETE_BATCH)
    }
}
