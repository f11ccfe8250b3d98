//! Dashboard configuration.
//!
//! Loaded from `config.toml` under the platform config directory; every
//! field has a default so an empty or missing file yields a working setup
//! against a local API server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hvac_core::{EngineConfig, ReconnectOptions, RefreshOptions};
use serde::{Deserialize, Serialize};

/// Dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API settings.
    pub api: ApiConfig,
    /// Push channel reconnect settings.
    pub reconnect: ReconnectConfig,
    /// Periodic refresh settings.
    pub refresh: RefreshConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// ```
    /// use hvac_dashboard::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.api.validate());
        errors.extend(self.reconnect.validate());
        errors.extend(self.refresh.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the engine configuration these settings describe.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.api.base_url.trim_end_matches('/'))
            .reconnect(self.reconnect.options())
            .refresh(self.refresh.options());
        config.api_timeout = Duration::from_secs(self.api.timeout_secs);
        if let Some(ws_url) = &self.api.ws_url {
            config = config.ws_url(ws_url.clone());
        }
        config
    }
}

/// REST API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the HVAC control API (e.g., "http://localhost:8000").
    pub base_url: String,
    /// Push channel URL. Derived from `base_url` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Maximum REST timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.base_url.is_empty() {
            errors.push(ValidationError::new("api.base_url", "base URL cannot be empty"));
        } else if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                "api.base_url",
                format!(
                    "invalid base URL '{}': expected an http:// or https:// URL",
                    self.base_url
                ),
            ));
        }

        if let Some(ws_url) = &self.ws_url
            && !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://"))
        {
            errors.push(ValidationError::new(
                "api.ws_url",
                format!("invalid push channel URL '{ws_url}': expected a ws:// or wss:// URL"),
            ));
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError::new("api.timeout_secs", "timeout cannot be 0"));
        } else if self.timeout_secs > MAX_TIMEOUT_SECS {
            errors.push(ValidationError::new(
                "api.timeout_secs",
                format!(
                    "timeout {} is too long (maximum {} seconds)",
                    self.timeout_secs, MAX_TIMEOUT_SECS
                ),
            ));
        }

        errors
    }
}

/// Push channel reconnect settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before each reconnect attempt, in milliseconds.
    pub delay_ms: u64,
    /// Double the delay after every failed attempt.
    pub exponential: bool,
    /// Upper bound for the delay when `exponential` is set.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            exponential: false,
            max_delay_ms: 60_000,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.delay_ms == 0 {
            errors.push(ValidationError::new(
                "reconnect.delay_ms",
                "reconnect delay cannot be 0",
            ));
        }
        if self.exponential && self.max_delay_ms < self.delay_ms {
            errors.push(ValidationError::new(
                "reconnect.max_delay_ms",
                format!(
                    "max delay {} must not be shorter than delay {}",
                    self.max_delay_ms, self.delay_ms
                ),
            ));
        }

        errors
    }

    pub fn options(&self) -> ReconnectOptions {
        let delay = Duration::from_millis(self.delay_ms);
        let max = Duration::from_millis(self.max_delay_ms);
        if self.exponential {
            ReconnectOptions::exponential(delay, max)
        } else {
            ReconnectOptions::fixed_delay(delay).max_delay(max)
        }
    }
}

/// Periodic refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between refresh cycles.
    pub interval_secs: u64,
    /// Minutes of history requested per cycle.
    pub history_minutes: u32,
}

/// Minimum refresh interval in seconds.
pub const MIN_REFRESH_INTERVAL: u64 = 5;
/// Maximum refresh interval in seconds (1 hour).
pub const MAX_REFRESH_INTERVAL: u64 = 3600;
/// Maximum history span in minutes (1 day).
pub const MAX_HISTORY_MINUTES: u32 = 1440;

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            history_minutes: 30,
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_REFRESH_INTERVAL {
            errors.push(ValidationError::new(
                "refresh.interval_secs",
                format!(
                    "refresh interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_REFRESH_INTERVAL
                ),
            ));
        } else if self.interval_secs > MAX_REFRESH_INTERVAL {
            errors.push(ValidationError::new(
                "refresh.interval_secs",
                format!(
                    "refresh interval {} is too long (maximum {} seconds / 1 hour)",
                    self.interval_secs, MAX_REFRESH_INTERVAL
                ),
            ));
        }

        if self.history_minutes == 0 || self.history_minutes > MAX_HISTORY_MINUTES {
            errors.push(ValidationError::new(
                "refresh.history_minutes",
                format!(
                    "history span {} must be between 1 and {} minutes",
                    self.history_minutes, MAX_HISTORY_MINUTES
                ),
            ));
        }

        errors
    }

    pub fn options(&self) -> RefreshOptions {
        RefreshOptions {
            interval: Duration::from_secs(self.interval_secs),
            history_minutes: self.history_minutes,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `api.base_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hvac-dashboard")
        .join("config.toml")
}
