//! Configuration settings for tickvault.
//!
//! Settings are loaded from `~/.tickvault/config.yaml`. Every field has a
//! default, so a missing file or a partial file is fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::error::TickvaultError;
use crate::features::sync::{QueueConfig, RetryConfig};
use crate::features::timer::CoordinatorConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralSettings,
    /// Retry executor settings.
    pub retry: RetrySettings,
    /// Request queue settings.
    pub queue: QueueSettings,
    /// Sync coordinator settings.
    pub sync: SyncSettings,
    /// Timer defaults.
    pub timer: TimerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralSettings {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default = "default_color")]
    pub color: ColorSetting,
    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

/// Retry executor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Cap for the un-jittered delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Request queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueSettings {
    /// Maximum queued requests.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Failed drain attempts before an entry is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause after requeueing a failed entry, in milliseconds.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

/// Sync coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between periodic flushes.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Endpoint name for teardown deliveries.
    #[serde(default = "default_teardown_endpoint")]
    pub teardown_endpoint: String,
}

/// Timer defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimerSettings {
    /// Countdown length used when `--countdown` has no value.
    #[serde(default = "default_countdown_minutes")]
    pub default_countdown_minutes: u64,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_color() -> ColorSetting {
    ColorSetting::Auto
}

fn default_log_level() -> String {
    "warn".to_string()
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    1000
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_capacity() -> usize {
    50
}

const fn default_item_delay_ms() -> u64 {
    1000
}

const fn default_interval_seconds() -> u64 {
    30
}

fn default_teardown_endpoint() -> String {
    "snapshots".to_string()
}

const fn default_countdown_minutes() -> u64 {
    25
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: default_color(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_retries: default_max_retries(),
            item_delay_ms: default_item_delay_ms(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            teardown_endpoint: default_teardown_endpoint(),
        }
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            default_countdown_minutes: default_countdown_minutes(),
        }
    }
}

impl RetrySettings {
    /// Runtime retry configuration.
    #[must_use]
    pub const fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

impl QueueSettings {
    /// Runtime queue configuration.
    #[must_use]
    pub const fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.capacity,
            max_retries: self.max_retries,
            item_delay: Duration::from_millis(self.item_delay_ms),
        }
    }
}

impl SyncSettings {
    /// Runtime coordinator configuration.
    #[must_use]
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            interval: Duration::from_secs(self.interval_seconds),
            teardown_endpoint: self.teardown_endpoint.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// values are out of range.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, TickvaultError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            TickvaultError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            TickvaultError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the runtime relies on.
    ///
    /// # Errors
    ///
    /// Returns [`TickvaultError::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<(), TickvaultError> {
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(TickvaultError::Config(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(TickvaultError::Config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(TickvaultError::Config(
                "queue.capacity must be at least 1".to_string(),
            ));
        }
        if self.sync.interval_seconds == 0 {
            return Err(TickvaultError::Config(
                "sync.interval_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), TickvaultError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| TickvaultError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            TickvaultError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.default_output, OutputFormat::Pretty);
        assert_eq!(config.general.color, ColorSetting::Auto);
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.retry.to_retry_config(), RetryConfig::default());
        assert_eq!(config.queue.to_queue_config(), QueueConfig::default());
        assert_eq!(config.sync.to_coordinator_config(), CoordinatorConfig::default());
        assert_eq!(config.timer.default_countdown_minutes, 25);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.retry.max_retries = 5;
        config.queue.capacity = 10;
        config.sync.interval_seconds = 60;

        config.save_to_path(&config_path).unwrap();
        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
retry:
  initial_delay_ms: 250
sync:
  teardown_endpoint: events
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.sync.teardown_endpoint, "events");
        assert_eq!(config.sync.interval_seconds, 30);
        assert_eq!(config.general.default_output, OutputFormat::Pretty);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        std::fs::write(&config_path, "retry:\n  multiplier: 0.5\n").unwrap();
        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, TickvaultError::Config(msg) if msg.contains("multiplier")));

        std::fs::write(&config_path, "queue:\n  capacity: 0\n").unwrap();
        assert!(Config::load_from_path(&config_path).is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "retry: [not, a, map").unwrap();

        assert!(matches!(
            Config::load_from_path(&config_path),
            Err(TickvaultError::Config(_))
        ));
    }
}
