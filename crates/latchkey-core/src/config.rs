//! Client configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the API base URL and the last used sign-in identifier.
//!
//! Configuration is stored at `~/.config/latchkey/config.json`; the token
//! document lives under the data directory so credentials and settings
//! never share a file.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "latchkey";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Sealed token document file name
const TOKEN_FILE: &str = "tokens.sealed";

/// Default API base URL for local development
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Environment variable overriding the API base URL
const BASE_URL_ENV: &str = "LATCHKEY_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub last_identifier: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            last_identifier: None,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when absent.
    /// `LATCHKEY_API_URL` overrides the stored base URL either way.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.is_empty() {
                config.base_url = url;
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Where the sealed token document lives.
    pub fn token_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join(TOKEN_FILE))
    }

    /// Keychain service name for the document sealing key.
    pub fn keychain_service() -> &'static str {
        APP_NAME
    }
}
