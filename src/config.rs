use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::CliArgs;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Config {
    pub version: u32,
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub poll_interval_secs: u64,
    /// Unset means "use the change log if the server has one"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_log_enabled: Option<bool>,
    #[serde(default)]
    pub ignored_folder_names: Vec<String>,
    #[serde(default)]
    pub ignored_file_names: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_uuid_attribute")]
    pub uuid_attribute: String,
    #[serde(default = "default_max_change_items")]
    pub max_change_items: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BusConfig {
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_uuid_attribute() -> String {
    "user.docsync.uuid".to_string()
}

fn default_max_change_items() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            repository: RepositoryConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            name: "docsync".to_string(),
            url: "http://localhost:8080/cmis/browser".to_string(),
            local_path: home.join("DocSync"),
            remote_path: "/".to_string(),
            poll_interval_secs: 5,
            change_log_enabled: None,
            ignored_folder_names: vec![".*".to_string()],
            ignored_file_names: vec![
                "*~".to_string(),
                ".~lock.*".to_string(),
                "*.tmp".to_string(),
                "*.sync".to_string(),
            ],
            max_retries: default_max_retries(),
            uuid_attribute: default_uuid_attribute(),
            max_change_items: default_max_change_items(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

pub fn get_default_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "docsync")
        .context("Failed to determine project directories")?;

    let config_dir = proj_dirs.config_dir();
    Ok(config_dir.join("docsync.toml"))
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p,
            None => get_default_config_path()?,
        };

        if !path.exists() {
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .context("Failed to create config directory")?;
            }
            default_config.save(&path)?;
            return Ok(default_config);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn from_cli_and_file(cli_args: CliArgs, config_path: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        // CLI args override config file
        if let Some(local_path) = cli_args.local_path {
            config.repository.local_path = local_path;
        }
        if let Some(interval) = cli_args.interval {
            config.repository.poll_interval_secs = interval;
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.repository.poll_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.bus.shutdown_timeout_secs)
    }
}
