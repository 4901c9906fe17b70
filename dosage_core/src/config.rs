//! Application configuration.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/dosage/config.toml` and
//! only says where the data files live. The insulin settings themselves are
//! kept in the plain `key = value` settings file (see `config_store`).

use crate::config_store::ConfigStore;
use crate::log_store::LogStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Settings file name, relative to `data_dir`
    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    /// Log file name, relative to `data_dir`
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            settings_file: default_settings_file(),
            log_file: default_log_file(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("dosage")
}

fn default_settings_file() -> String {
    "config.txt".into()
}

fn default_log_file() -> String {
    "logs.txt".into()
}

impl DataConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(&self.settings_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.settings_path())
    }

    pub fn log_store(&self) -> LogStore {
        LogStore::new(self.log_path())
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("dosage").join("config.toml")
    }

}
