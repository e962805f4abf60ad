use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Base URL of the document store, e.g. `https://backup.example.com/v1`.
    pub remote_url: Option<String>,
    /// Signed-in user. No user means no session.
    pub remote_user: Option<String>,
    pub remote_token: Option<String>,

    #[serde(default = "default_sync_interval")]
    pub sync_interval_minutes: u64,

    #[serde(default = "default_extraction_workers")]
    pub extraction_workers: usize,

    #[serde(default = "default_extraction_page_size")]
    pub extraction_page_size: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("readlater");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("library.db").to_string_lossy().to_string()
}

fn default_sync_interval() -> u64 {
    15
}

fn default_extraction_workers() -> usize {
    5
}

fn default_extraction_page_size() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            remote_url: None,
            remote_user: None,
            remote_token: None,
            sync_interval_minutes: default_sync_interval(),
            extraction_workers: default_extraction_workers(),
            extraction_page_size: default_extraction_page_size(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Loads the config, writing defaults to `path` on first run.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readlater")
            .join("config.toml")
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.sync_interval_minutes == 0 {
            return Err(AppError::Config("sync_interval_minutes must be at least 1".to_string()));
        }
        if self.extraction_workers == 0 || self.extraction_page_size == 0 {
            return Err(AppError::Config(
                "extraction_workers and extraction_page_size must be positive".to_string(),
            ));
        }
        if let Some(remote_url) = &self.remote_url {
            url::Url::parse(remote_url)?;
        }
        Ok(())
    }
}
