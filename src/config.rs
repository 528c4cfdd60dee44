use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub blacklist: BlacklistConfig,

    #[serde(default)]
    pub update: UpdateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlacklistConfig {
    /// Directory holding the index, version marker and rule files.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_index_filename")]
    pub index_filename: String,

    /// Explicit ordered rule files. When non-empty this overrides the
    /// directory/index form; such a store carries no version marker and
    /// cannot be updated.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateConfig {
    #[serde(default = "default_source_url")]
    pub source_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_directory() -> PathBuf {
    PathBuf::from("blacklists")
}
fn default_index_filename() -> String {
    "index".to_string()
}
fn default_source_url() -> String {
    "https://raw.githubusercontent.com/spamfence/blacklists/main".to_string()
}
fn default_user_agent() -> String {
    format!("spamfence/{}", env!("CARGO_PKG_VERSION"))
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blacklist: BlacklistConfig::default(),
            update: UpdateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            index_filename: default_index_filename(),
            files: vec![],
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}
