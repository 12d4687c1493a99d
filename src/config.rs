//! Configuration for the outbox agent.

use crate::environment::ShutdownPolicy;
use crate::outbox::file::DEFAULT_LOCK_RETRIES;
use crate::time::{NormalizeError, Normalizer, ZoneRule};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding outbox documents, locks and transparency stats
    pub data_path: PathBuf,

    /// IANA zone, fixed offset (`+09:00`) or `system`; unset follows the host
    pub timezone: Option<String>,

    /// Interval between ambient samples
    #[serde(with = "duration_serde")]
    pub sample_interval: Duration,

    /// Retries for a contended outbox lock before reporting a timeout
    pub lock_retries: u32,

    /// Persist samples still buffered when the light monitor stops
    pub flush_samples_on_shutdown: bool,

    /// Log every saved session, timestamp conversion and commit at debug level
    pub verbose_diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sleep-outbox");

        Self {
            data_path: data_dir,
            timezone: None,
            sample_interval: Duration::from_secs(5),
            lock_retries: DEFAULT_LOCK_RETRIES,
            flush_samples_on_shutdown: true,
            verbose_diagnostics: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sleep-outbox")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Directory for outbox documents.
    pub fn outbox_dir(&self) -> PathBuf {
        self.data_path.join("outbox")
    }

    /// File for persisted transparency stats.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// The zone rule named by `timezone`.
    pub fn zone_rule(&self) -> Result<ZoneRule, ConfigError> {
        match self.timezone.as_deref() {
            None => Ok(ZoneRule::System),
            Some(name) => Ok(name.parse()?),
        }
    }

    /// A normalizer for the configured zone.
    pub fn normalizer(&self) -> Result<Normalizer, ConfigError> {
        self.zone_rule().map(Normalizer::new)
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        if self.flush_samples_on_shutdown {
            ShutdownPolicy::Flush
        } else {
            ShutdownPolicy::Discard
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid timezone: {0}")]
    Timezone(#[from] NormalizeError),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sample_interval, Duration::from_secs(5));
        assert!(config.flush_samples_on_shutdown);
        assert!(!config.verbose_diagnostics);
        assert_eq!(config.zone_rule().unwrap(), ZoneRule::System);
        assert_eq!(config.shutdown_policy(), ShutdownPolicy::Flush);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"timezone": "Asia/Seoul", "sample_interval": 30}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.sample_interval, Duration::from_secs(30));
        assert_eq!(config.lock_retries, DEFAULT_LOCK_RETRIES);
        assert_eq!(
            config.normalizer().unwrap().normalize(1_700_000_000_000).unwrap(),
            "2023-11-15T07:13:20.000+09:00"
        );
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let config = Config {
            flush_samples_on_shutdown: false,
            verbose_diagnostics: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert!(!reloaded.flush_samples_on_shutdown);
        assert!(reloaded.verbose_diagnostics);
        assert_eq!(reloaded.shutdown_policy(), ShutdownPolicy::Discard);
    }

    #[test]
    fn test_bad_timezone_is_reported() {
        let config = Config {
            timezone: Some("Nowhere/Special".to_string()),
            ..Config::default()
        };
        assert!(matches!(config.normalizer(), Err(ConfigError::Timezone(_))));
    }

    #[test]
    fn test_ensure_directories_creates_data_path() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_path: temp_dir.path().join("data"),
            ..Config::default()
        };

        config.ensure_directories().unwrap();
        assert!(config.data_path.is_dir());
    }

    #[test]
    fn test_default_lock_retries() {
        assert_eq!(Config::default().lock_retries, 5);
    }
}
