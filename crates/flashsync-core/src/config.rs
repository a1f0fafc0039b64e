//! Configuration module for flashsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, TargetFilter, TargetPeriod};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for flashsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub card: CardConfig,
    pub sync: SyncConfig,
    pub auto_check: AutoCheckConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

/// Where the card is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Base URL of the card, ending in `/`.
    pub remote_root: String,
}

/// What is copied and where it lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the local photo folder; copies go to `<local_folder>/<yyyyMMdd>/`.
    pub local_folder: PathBuf,
    /// Which dates are copied: `all`, `today`, or `select`.
    pub target_period: TargetPeriod,
    /// Dates used when `target_period` is `select`.
    pub target_dates: Vec<NaiveDate>,
    /// Delete each file from the card once its local copy is confirmed.
    pub delete_upon_copy: bool,
    /// Lowercase the extension of local copies.
    pub lowercase_extension: bool,
    /// Keep local copies of files deleted on the card by moving them to the recycle folder.
    pub moves_file_to_recycle: bool,
    /// Recycle folder; defaults to `<local_folder>/.recycle`.
    pub recycle_folder: Option<PathBuf>,
    /// Copy immediately when a file is selected by hand.
    pub instant_copy: bool,
}

/// Recurring check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCheckConfig {
    /// Seconds between automatic checks.
    pub interval_secs: u64,
    /// Seconds to wait after a failed automatic check.
    pub failure_cooldown_secs: u64,
    /// Seconds after which a full listing is forced regardless of the update probe.
    pub full_check_threshold_secs: u64,
}

/// Transfer primitive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Seconds to wait for response headers (and for an unsized body).
    pub timeout_secs: u64,
    /// Seconds between link liveness checks during a request.
    pub monitor_interval_secs: u64,
    /// Attempts made for requests failing with "connection unable".
    pub max_attempts: u32,
    /// Milliseconds between attempts.
    pub retry_delay_ms: u64,
    /// Read buffer size for sized downloads.
    pub buffer_size: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/flashsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("flashsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            remote_root: "http://flashair/".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let pictures = dirs::picture_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Pictures")
        });
        Self {
            local_folder: pictures.join("FlashAirImages"),
            target_period: TargetPeriod::All,
            target_dates: Vec::new(),
            delete_upon_copy: false,
            lowercase_extension: true,
            moves_file_to_recycle: false,
            recycle_folder: None,
            instant_copy: true,
        }
    }
}

impl Default for AutoCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            failure_cooldown_secs: 5,
            full_check_threshold_secs: 600,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            monitor_interval_secs: 2,
            max_attempts: 3,
            retry_delay_ms: 500,
            buffer_size: 64 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn target_filter(&self) -> TargetFilter {
        TargetFilter::new(self.target_period, self.target_dates.clone())
    }

    pub fn recycle_folder(&self) -> PathBuf {
        self.recycle_folder
            .clone()
            .unwrap_or_else(|| self.local_folder.join(".recycle"))
    }
}

impl AutoCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    pub fn full_check_threshold(&self) -> Duration {
        Duration::from_secs(self.full_check_threshold_secs)
    }
}

impl TransferConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Checks that `root` has the `http(s)://host/` shape.
pub fn validate_remote_root(root: &str) -> Result<(), DomainError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^https?://.+/$").expect("root pattern is valid"));

    if pattern.is_match(root) {
        Ok(())
    } else {
        Err(DomainError::InvalidRemoteRoot(root.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"auto_check.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- auto_check ---
        positive("auto_check.interval_secs", self.auto_check.interval_secs);
        positive(
            "auto_check.full_check_threshold_secs",
            self.auto_check.full_check_threshold_secs,
        );

        // --- transfer ---
        positive("transfer.timeout_secs", self.transfer.timeout_secs);
        positive(
            "transfer.monitor_interval_secs",
            self.transfer.monitor_interval_secs,
        );
        positive("transfer.max_attempts", u64::from(self.transfer.max_attempts));
        positive("transfer.buffer_size", self.transfer.buffer_size as u64);

        // --- card ---
        if let Err(e) = validate_remote_root(&self.card.remote_root) {
            errors.push(ValidationError {
                field: "card.remote_root".into(),
                message: format!("{e}; expected http(s)://host/"),
            });
        }

        // --- sync ---
        if self.sync.local_folder.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "sync.local_folder".into(),
                message: "must not be empty".into(),
            });
        }
        if !self.sync.target_filter().is_usable() {
            errors.push(ValidationError {
                field: "sync.target_dates".into(),
                message: "at least one date is required when target_period is 'select'".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use flashsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .remote_root("http://192.168.0.1/")
///     .local_folder(PathBuf::from("/home/user/Pictures/FlashAir"))
///     .delete_upon_copy(true)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- card ---

    pub fn remote_root(mut self, root: impl Into<String>) -> Self {
        self.config.card.remote_root = root.into();
        self
    }

    // --- sync ---

    pub fn local_folder(mut self, folder: PathBuf) -> Self {
        self.config.sync.local_folder = folder;
        self
    }

    pub fn target_period(mut self, period: TargetPeriod) -> Self {
        self.config.sync.target_period = period;
        self
    }

    pub fn target_dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.config.sync.target_dates = dates;
        self
    }

    pub fn delete_upon_copy(mut self, enabled: bool) -> Self {
        self.config.sync.delete_upon_copy = enabled;
        self
    }

    pub fn lowercase_extension(mut self, enabled: bool) -> Self {
        self.config.sync.lowercase_extension = enabled;
        self
    }

    pub fn moves_file_to_recycle(mut self, enabled: bool) -> Self {
        self.config.sync.moves_file_to_recycle = enabled;
        self
    }

    pub fn recycle_folder(mut self, folder: PathBuf) -> Self {
        self.config.sync.recycle_folder = Some(folder);
        self
    }

    pub fn instant_copy(mut self, enabled: bool) -> Self {
        self.config.sync.instant_copy = enabled;
        self
    }

    // --- auto_check ---

    pub fn auto_check_interval_secs(mut self, seconds: u64) -> Self {
        self.config.auto_check.interval_secs = seconds;
        self
    }

    pub fn auto_check_failure_cooldown_secs(mut self, seconds: u64) -> Self {
        self.config.auto_check.failure_cooldown_secs = seconds;
        self
    }

    pub fn auto_check_full_check_threshold_secs(mut self, seconds: u64) -> Self {
        self.config.auto_check.full_check_threshold_secs = seconds;
        self
    }

    // --- transfer ---

    pub fn transfer_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.transfer.timeout_secs = seconds;
        self
    }

    pub fn transfer_monitor_interval_secs(mut self, seconds: u64) -> Self {
        self.config.transfer.monitor_interval_secs = seconds;
        self
    }

    pub fn transfer_max_attempts(mut self, attempts: u32) -> Self {
        self.config.transfer.max_attempts = attempts;
        self
    }

    pub fn transfer_retry_delay_ms(mut self, millis: u64) -> Self {
        self.config.transfer.retry_delay_ms = millis;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
