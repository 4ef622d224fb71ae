//! Configuration management for pint.
//!
//! Settings are read from `~/.pint/config.toml`. A missing or unreadable
//! file means defaults; command-line switches override whatever is loaded.
//!
//! # Configuration File
//!
//! ```toml
//! # Log filter for ~/.pint/pint.log (PINT_LOG takes precedence)
//! log_level = "info"
//!
//! [session]
//! enter = "crlf"             # or "nothing"
//! input = "plain"            # or "escaped"
//! sent_format = "wide"       # wide, text or hex
//! received_format = "wide"
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::session::SessionState;

const CONFIG_DIR: &str = ".pint";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log filter directive
    pub log_level: String,
    /// Initial session modes
    pub session: SessionState,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            session: SessionState::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(config) = toml::from_str(&content) {
                        return config;
                    }
                }
            }
        }
        Self::default()
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        pint_dir().map(|dir| dir.join("config.toml"))
    }

    /// Log file path
    pub fn log_path() -> PathBuf {
        pint_dir()
            .map(|dir| dir.join("pint.log"))
            .unwrap_or_else(|| PathBuf::from("pint.log"))
    }
}

/// `~/.pint`, created if missing
fn pint_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(CONFIG_DIR);
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
