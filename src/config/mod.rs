//! # Configuration
//!
//! Shard configuration is a TOML file with one table per concern:
//!
//! - [`ShardConfig`] - shard name and data directory
//! - [`PersistenceConfig`] - load policy and backup location
//! - [`AutoSaveConfig`] - autosave schedule and backup retention
//! - [`AccountsConfig`] - account name rules and password hashing cost
//! - [`LoggingConfig`] - log level and optional log file
//! - [`CommandsConfig`] - staff command logging
//!
//! Every field has a default, so a partial file (or none, via `shardkeep init`)
//! is enough to start.
//!
//! ```toml
//! [shard]
//! name = "Angel Island"
//! data_dir = "./data"
//!
//! [persistence]
//! load_policy = "abort"
//!
//! [autosave]
//! enabled = true
//! frequency = "Every15Minutes"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::storage::autosave::SaveFrequency;
use crate::storage::backup::RetentionPolicy;
use crate::world::LoadPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub shard: ShardConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    pub name: String,
    /// Root of all persisted state: the save, accounts, firewall, logs.
    pub data_dir: String,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            name: "shardkeep".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// What to do with a record that cannot be loaded: `abort` or `skip`.
    pub load_policy: LoadPolicy,
    /// Backup archive directory. Defaults to `<data_dir>/backups`.
    pub backup_dir: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            load_policy: LoadPolicy::Abort,
            backup_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    pub frequency: SaveFrequency,
    /// Archive the previous save before each autosave overwrites it.
    pub archive_previous: bool,
    pub retention: RetentionPolicy,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: SaveFrequency::Every15Minutes,
            archive_previous: true,
            retention: RetentionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub min_name_length: usize,
    pub max_name_length: usize,
    pub allow_spaces: bool,
    pub min_password_length: usize,
    /// Accounts allowed per login address; 0 means unlimited.
    pub max_accounts_per_ip: usize,
    pub argon2: Option<Argon2Config>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            min_name_length: 2,
            max_name_length: 16,
            allow_spaces: true,
            min_password_length: 8,
            max_accounts_per_ip: 3,
            argon2: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("shardkeep.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Write staff commands to the command log.
    pub log_enabled: bool,
    /// Defaults to `<data_dir>/Logs/Commands`.
    pub log_dir: Option<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            log_enabled: true,
            log_dir: None,
        }
    }
}

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard.data_dir.trim().is_empty() {
            return Err(anyhow!("shard.data_dir must not be empty"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(anyhow!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        let accounts = &self.accounts;
        if accounts.min_name_length == 0 || accounts.min_name_length > accounts.max_name_length {
            return Err(anyhow!(
                "accounts name length range {}..={} is empty",
                accounts.min_name_length,
                accounts.max_name_length
            ));
        }
        if accounts.min_password_length < 4 {
            return Err(anyhow!("accounts.min_password_length must be at least 4"));
        }
        if self.autosave.enabled && self.autosave.frequency == SaveFrequency::Disabled {
            return Err(anyhow!(
                "autosave is enabled but its frequency is Disabled; set autosave.enabled = false instead"
            ));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.shard.data_dir)
    }

    pub fn backup_dir(&self) -> PathBuf {
        match &self.persistence.backup_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.data_dir().join("backups"),
        }
    }

    pub fn command_log_dir(&self) -> PathBuf {
        match &self.commands.log_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.data_dir().join("Logs").join("Commands"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.persistence.load_policy, LoadPolicy::Abort);
        assert_eq!(config.backup_dir(), PathBuf::from("./data").join("backups"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [shard]
            name = "Angel Island"

            [persistence]
            load_policy = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(config.shard.name, "Angel Island");
        assert_eq!(config.shard.data_dir, "./data");
        assert_eq!(config.persistence.load_policy, LoadPolicy::Skip);
        assert!(config.commands.log_enabled);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.autosave.frequency, SaveFrequency::Every15Minutes);
        assert_eq!(back.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.autosave.frequency = SaveFrequency::Disabled;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.accounts.min_name_length = 20;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.shard.name, "shardkeep");
    }
}
