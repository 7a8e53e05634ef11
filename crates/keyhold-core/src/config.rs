//! Client configuration management.
//!
//! Configuration is stored at `~/.config/keyhold/config.json`. Every field
//! has a default so a missing or partial file still loads. Per-context data
//! (token slot, sealed credential set, pending OAuth links) lives under
//! `~/.cache/keyhold/<context>`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::auth::session::DEFAULT_ACCESS_TOKEN_MINUTES;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "keyhold";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Longest access credential lifetime accepted from the config (one week).
const MAX_ACCESS_TOKEN_MINUTES: i64 = 7 * 24 * 60;

pub const ENV_API_URL: &str = "KEYHOLD_API_URL";
pub const ENV_USERNAME: &str = "KEYHOLD_USERNAME";
pub const ENV_PASSWORD: &str = "KEYHOLD_PASSWORD";
pub const ENV_PASSPHRASE: &str = "KEYHOLD_PASSPHRASE";

/// Where the credential pair of a context is kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// Plain JSON file in the context data directory.
    #[default]
    File,
    /// JSON file sealed with a passphrase-derived key.
    Sealed,
    /// OS keyring entry.
    Keyring,
    /// Nothing survives the process.
    Memory,
}

/// Hosts the built-in verifiers and the OAuth exchange talk to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    pub slack_api: String,
    pub google_api: String,
    pub google_token: String,
    pub oauth_redirect_uri: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            slack_api: "https://slack.com/api".to_string(),
            google_api: "https://www.googleapis.com".to_string(),
            google_token: "https://oauth2.googleapis.com/token".to_string(),
            oauth_redirect_uri: "http://localhost:8000/api/oauth/google/callback".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub last_username: Option<String>,
    /// Name of the client context; selects the data directory.
    pub context: String,
    pub access_token_minutes: i64,
    pub test_timeout_secs: u64,
    pub token_storage: TokenStorage,
    /// Keep the credential set and pending OAuth links in sealed files
    /// between runs. Needs a passphrase.
    pub persist_credentials: bool,
    /// Overrides the per-context data directory.
    pub data_dir: Option<PathBuf>,
    pub endpoints: ServiceEndpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            last_username: None,
            context: "default".to_string(),
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            test_timeout_secs: 15,
            token_storage: TokenStorage::default(),
            persist_credentials: true,
            data_dir: None,
            endpoints: ServiceEndpoints::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding this context's token slot and credential file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(&self.context))
    }

    /// Access credential lifetime used when a token carries no `exp`.
    /// Out-of-range values fall back to the default.
    pub fn access_token_lifetime(&self) -> Duration {
        if (1..=MAX_ACCESS_TOKEN_MINUTES).contains(&self.access_token_minutes) {
            return Duration::minutes(self.access_token_minutes);
        }
        warn!(
            access_token_minutes = self.access_token_minutes,
            "Ignoring out-of-range access token lifetime"
        );
        Duration::minutes(DEFAULT_ACCESS_TOKEN_MINUTES)
    }

    /// Apply `KEYHOLD_API_URL` and `KEYHOLD_USERNAME` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(username) = lookup(ENV_USERNAME).filter(|v| !v.trim().is_empty()) {
            self.last_username = Some(username.trim().to_string());
        }
    }

    /// Configuration for a throwaway context that never touches disk.
    pub fn in_memory(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            token_storage: TokenStorage::Memory,
            persist_credentials: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("config.json")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.test_timeout_secs, 15);
        assert_eq!(config.access_token_minutes, 30);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"token_storage": "sealed", "last_username": "alice"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.token_storage, TokenStorage::Sealed);
        assert_eq!(config.last_username.as_deref(), Some("alice"));
        assert_eq!(config.context, "default");
        assert_eq!(config.endpoints, ServiceEndpoints::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.test_timeout_secs = 5;
        config.persist_credentials = false;
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_API_URL => Some(" https://keyhold.example/api ".to_string()),
            ENV_USERNAME => Some("bob".to_string()),
            _ => None,
        });

        assert_eq!(config.api_base_url, "https://keyhold.example/api");
        assert_eq!(config.last_username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_persists_and_in_memory_does_not() {
        assert!(Config::default().persist_credentials);

        let config = Config::in_memory("http://localhost:9999/api");
        assert!(!config.persist_credentials);
        assert_eq!(config.token_storage, TokenStorage::Memory);
    }

    #[test]
    fn test_access_token_lifetime_is_bounded() {
        let mut config = Config::default();
        assert_eq!(config.access_token_lifetime(), Duration::minutes(30));

        config.access_token_minutes = 90;
        assert_eq!(config.access_token_lifetime(), Duration::minutes(90));

        for bad in [0, -5, i64::MAX] {
            config.access_token_minutes = bad;
            assert_eq!(config.access_token_lifetime(), Duration::minutes(30));
        }
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.data_dir = Some(PathBuf::from("/tmp/keyhold-test"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/keyhold-test"));
    }
}
