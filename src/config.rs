//! Configuration management with XDG paths
//!
//! ~/.config/talk/config.json   - backend URL, preferences
//! ~/.local/state/talk/         - history.json, talk.log

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::message::TITLE_LEN;

const APP_NAME: &str = "talk";

/// Where a local backend listens by default
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Environment override for the backend URL
pub const BACKEND_URL_ENV: &str = "TALK_BACKEND_URL";

/// Get config directory (~/.config/talk/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get state directory (~/.local/state/talk/)
pub fn state_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// The single history slot
pub fn history_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("history.json"))
}

/// Log file (the TUI owns the terminal, so logs go here)
pub fn log_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("talk.log"))
}

/// Ensure all directories exist
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(state_dir()?)?;
    Ok(())
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Talk backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Health probe interval (seconds)
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Characters kept when titling a new conversation
    #[serde(default = "default_title_len")]
    pub title_len: usize,
}

fn default_backend_url() -> String { DEFAULT_BACKEND_URL.to_string() }
fn default_health_interval() -> u64 { 5 }
fn default_title_len() -> usize { TITLE_LEN }

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            health_interval_secs: default_health_interval(),
            title_len: default_title_len(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults
    pub fn load() -> Result<Self> {
        ensure_dirs()?;
        let path = config_path()?;

        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let path = config_path()?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Set a value by its CLI key name
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "url" | "backend" | "backend_url" => {
                let url = value.trim().trim_end_matches('/');
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    anyhow::bail!("Backend URL must start with http:// or https://");
                }
                self.backend_url = url.to_string();
            }
            "interval" | "health_interval_secs" => {
                let secs: u64 = value.parse().context("Interval must be a whole number of seconds")?;
                if secs == 0 {
                    anyhow::bail!("Interval must be at least 1 second");
                }
                self.health_interval_secs = secs;
            }
            "title-len" | "title_len" => {
                let len: usize = value.parse().context("Title length must be a number")?;
                if len == 0 {
                    anyhow::bail!("Title length must be at least 1");
                }
                self.title_len = len;
            }
            _ => anyhow::bail!("Unknown config key: {}. Valid keys: url, interval, title-len", key),
        }
        Ok(())
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }
}

/// Backend URL from environment or config
pub fn backend_url(cfg: &Config) -> String {
    // Environment variable takes precedence
    if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
        if !url.is_empty() {
            return url.trim_end_matches('/').to_string();
        }
    }
    cfg.backend_url.trim_end_matches('/').to_string()
}
