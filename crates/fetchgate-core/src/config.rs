//! Application configuration management.
//!
//! Configuration is stored at `~/.config/fetchgate/config.json`. Missing
//! files and missing fields fall back to defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{
    CredentialStore, FileBackend, KeyringBackend, MemoryBackend, TokenBackend, DEFAULT_LOGIN_PATH,
};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "fetchgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

const DEFAULT_JOKE_URL: &str = "https://icanhazdadjoke.com/";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the session token is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub joke_url: String,
    pub storage: StorageKind,
    pub request_timeout_secs: u64,
    pub login_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            joke_url: DEFAULT_JOKE_URL.to_string(),
            storage: StorageKind::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_json(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build the token backend selected by `storage`
    pub fn token_backend(&self) -> Result<Box<dyn TokenBackend>> {
        Ok(match self.storage {
            StorageKind::File => {
                let cache_dir = self.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
                Box::new(FileBackend::new(cache_dir))
            }
            StorageKind::Keyring => Box::new(KeyringBackend::new()?),
            StorageKind::Memory => Box::new(MemoryBackend::new()),
        })
    }

    /// Open the credential store on the configured backend
    pub fn credential_store(&self) -> Result<CredentialStore> {
        CredentialStore::init(self.token_backend()?)
    }
}
