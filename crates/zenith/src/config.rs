//! Bootstrap configuration for the Zenith host.
//!
//! Everything the host needs before the YAML config registry exists: where
//! the registry lives, how to log, and how often to run scheduled jobs. The
//! database connection itself is read from `core.yaml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

fn default_tick_rate() -> u32 {
    64
}

fn default_checkpoint_interval() -> u64 {
    300
}

/// Host configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host settings
    pub host: HostSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Directory holding `core.yaml` and `modules/`
    pub config_dir: String,
    /// Where pre-migration backups are written
    pub backup_dir: String,
    /// Host ticks per second; the dispatcher is drained once per tick
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// Seconds between checkpoints of every active player
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
    /// Allow namespace lookups to match by suffix
    #[serde(default)]
    pub namespace_suffix_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostSettings {
                config_dir: "configs".to_string(),
                backup_dir: "backups".to_string(),
                tick_rate_hz: default_tick_rate(),
                checkpoint_interval_secs: default_checkpoint_interval(),
                namespace_suffix_fallback: false,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads the file, writing the defaults to `path` first when it is missing.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        PathBuf::from(&self.host.config_dir)
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.host.backup_dir)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.host.tick_rate_hz.max(1)))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.host.checkpoint_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.config_dir.is_empty() {
            return Err("Config directory cannot be empty".to_string());
        }
        if self.host.backup_dir.is_empty() {
            return Err("Backup directory cannot be empty".to_string());
        }
        if self.host.tick_rate_hz == 0 || self.host.tick_rate_hz > 1000 {
            return Err(format!(
                "Invalid tick rate: {}. Must be between 1 and 1000",
                self.host.tick_rate_hz
            ));
        }
        if self.host.checkpoint_interval_secs == 0 {
            return Err("Checkpoint interval must be at least one second".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        Ok(())
    }
}
