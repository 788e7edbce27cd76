use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::uploader::UploadSettings;

pub const DEFAULT_BASE_URL: &str = "https://api.memo.wirewire.de/v1";
pub const DEFAULT_INPUT_DIR: &str = "/media/picture-frames/paperlesspaper";
pub const DEFAULT_PUBLISH_DIR: &str = "/config/www/picture-frames/paperlesspaper";

const APP_DIR_NAME: &str = "paperless-push";
const MIN_SCAN_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub paper_id: String,
    pub base_url: String,
    pub input_dir: PathBuf,
    pub publish_dir: PathBuf,
    /// Recency window, last result and the cycle lock live here.
    pub state_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub publish: bool,
    pub scan_interval_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            paper_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            publish_dir: PathBuf::from(DEFAULT_PUBLISH_DIR),
            state_dir: None,
            timeout_secs: 30,
            max_attempts: 4,
            publish: true,
            scan_interval_secs: 3600,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
        }
    }

    pub fn state_dir(&self) -> AppResult<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_data_directory(),
        }
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR_NAME);

    Ok(config_dir.join("config.json"))
}

pub fn get_data_directory() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Could not find data directory".to_string()))?
        .join(APP_DIR_NAME);

    Ok(data_dir)
}

/// Read the config at `path`, writing defaults there first if it does not exist.
///
/// The result is not validated: credentials may still come from the environment.
pub fn load_config(path: &Path) -> AppResult<Config> {
    if path.exists() {
        let config_str = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_str).map_err(|e| {
            AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    } else {
        let default_config = Config::default();
        if let Err(e) = save_config(path, &default_config) {
            log::warn!("Could not write default config to {}: {}", path.display(), e);
        } else {
            log::info!("Wrote default configuration to {}", path.display());
        }
        Ok(default_config)
    }
}

pub fn save_config(path: &Path, config: &Config) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Keep one backup of the previous file
    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str)?;
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.api_key.trim().is_empty() {
        return Err(AppError::validation("api_key", "API key is required"));
    }

    let paper_id_pattern = Regex::new(r"^[A-Za-z0-9_-]{1,128}$")
        .map_err(|e| AppError::Config(e.to_string()))?;
    if !paper_id_pattern.is_match(&config.paper_id) {
        return Err(AppError::validation(
            "paper_id",
            "Must be 1-128 letters, digits, '-' or '_'",
        ));
    }

    let url_pattern =
        Regex::new(r"^https?://[^\s/]+(/\S*)?$").map_err(|e| AppError::Config(e.to_string()))?;
    if !url_pattern.is_match(&config.base_url) {
        return Err(AppError::validation("base_url", "Must be an http(s) URL"));
    }

    if config.timeout_secs == 0 {
        return Err(AppError::validation("timeout_secs", "Must be at least 1 second"));
    }

    if config.max_attempts == 0 || config.max_attempts > 10 {
        return Err(AppError::validation("max_attempts", "Must be between 1 and 10"));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

/// Only the `run` loop uses the configured interval, so only it checks it.
pub fn validate_scan_interval(config: &Config) -> AppResult<()> {
    if config.scan_interval_secs < MIN_SCAN_INTERVAL_SECS {
        return Err(AppError::validation(
            "scan_interval_secs",
            "Must be at least 60 seconds",
        ));
    }
    Ok(())
}
