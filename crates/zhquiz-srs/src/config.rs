//! Configuration for the quiz scheduler.

use crate::error::ConfigError;
use crate::interval::IntervalPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User id the CLI acts as.
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_user() -> String { "local".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            user: default_user(),
            schedule: ScheduleConfig::default(),
            service: ServiceConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.interval_policy()?;
        if self.service.max_attempts == 0 {
            return Err(ConfigError::Invalid("service.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "zhquiz")
            .map(|d| d.config_dir().join("config.toml"))
    }

    /// Database path: the configured one, else the platform data dir.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.storage.database.clone().or_else(|| {
            directories::ProjectDirs::from("", "", "zhquiz")
                .map(|d| d.data_dir().join("zhquiz.db"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Delay per SRS level in seconds; built-in table when absent.
    #[serde(default)]
    pub interval_secs: Option<Vec<u64>>,
    /// Fixed seed for the due-item shuffle.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl ScheduleConfig {
    pub fn interval_policy(&self) -> Result<IntervalPolicy, ConfigError> {
        match &self.interval_secs {
            Some(secs) => IntervalPolicy::from_secs(secs),
            None => Ok(IntervalPolicy::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Attempts at a mark before reporting a conflict.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Default deadline for repository calls.
    #[serde(default = "default_repository_timeout")]
    pub repository_timeout_ms: u64,
    /// Deadline for the background preference save.
    #[serde(default = "default_preference_timeout")]
    pub preference_timeout_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_repository_timeout() -> u64 { 5000 }
fn default_preference_timeout() -> u64 { 2000 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            repository_timeout_ms: 5000,
            preference_timeout_ms: 2000,
        }
    }
}

impl ServiceConfig {
    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }

    pub fn preference_timeout(&self) -> Duration {
        Duration::from_millis(self.preference_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}
