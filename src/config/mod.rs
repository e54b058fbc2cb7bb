//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::CredentialStore;
use crate::models::User;

const DEFAULT_API_URL: &str = "http://localhost:4000/api";
const DEFAULT_SOCKET_URL: &str = "http://localhost:4001";

/// Environment overrides, applied on every load.
const ENV_API_URL: &str = "IEUM_API_URL";
const ENV_SOCKET_URL: &str = "IEUM_SOCKET_URL";

/// Application configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// REST API base URL (no trailing slash)
    #[serde(default = "default_api_url")]
    api_url: String,
    /// Socket.IO server base URL
    #[serde(default = "default_socket_url")]
    socket_url: String,
    /// Bearer token from the last login
    pub token: Option<String>,
    /// Cached profile of the logged-in user
    pub user: Option<User>,
    /// Endpoints from the environment. Never written back to disk.
    #[serde(skip)]
    env_api_url: Option<String>,
    #[serde(skip)]
    env_socket_url: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            socket_url: default_socket_url(),
            token: None,
            user: None,
            env_api_url: None,
            env_socket_url: None,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ieum", "ieum-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Pick up endpoint overrides from the environment.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.env_api_url = lookup(ENV_API_URL).filter(|u| !u.is_empty());
        self.env_socket_url = lookup(ENV_SOCKET_URL).filter(|u| !u.is_empty());
    }

    /// REST base URL, environment first
    pub fn api_url(&self) -> &str {
        self.env_api_url
            .as_deref()
            .unwrap_or(&self.api_url)
            .trim_end_matches('/')
    }

    /// Socket.IO base URL, environment first
    pub fn socket_url(&self) -> &str {
        self.env_socket_url
            .as_deref()
            .unwrap_or(&self.socket_url)
            .trim_end_matches('/')
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains the token)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }
}

impl CredentialStore for Config {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn user(&self) -> Option<User> {
        self.user.clone()
    }

    fn set_session(&mut self, token: String, user: User) -> Result<()> {
        self.token = Some(token);
        self.user = Some(user);
        self.save()
    }

    fn set_user(&mut self, user: User) -> Result<()> {
        self.user = Some(user);
        self.save()
    }

    fn clear_credentials(&mut self) -> Result<()> {
        self.token = None;
        self.user = None;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.socket_url(), DEFAULT_SOCKET_URL);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_env_overrides_and_trims() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_API_URL => Some("https://chat.example.com/api/".to_string()),
            ENV_SOCKET_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_url(), "https://chat.example.com/api");
        assert_eq!(config.socket_url(), DEFAULT_SOCKET_URL);
    }

    #[test]
    fn test_env_override_not_saved() {
        let mut config: Config = toml::from_str("api_url = \"https://saved.example.com/api/\"").unwrap();
        assert_eq!(config.api_url(), "https://saved.example.com/api");

        config.apply_env(|key| (key == ENV_API_URL).then(|| "http://127.0.0.1:9000/api".to_string()));
        assert_eq!(config.api_url(), "http://127.0.0.1:9000/api");

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("127.0.0.1"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.api_url(), "https://saved.example.com/api");
    }

    #[test]
    fn test_toml_roundtrip_keeps_cached_user() {
        let mut config = Config::default();
        config.token = Some("jwt".into());
        config.user = Some(serde_json::from_str(r#"{"id":3,"name":"Lee","email":"l@x"}"#).unwrap());

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.token.as_deref(), Some("jwt"));
        assert_eq!(back.user.map(|u| u.id), Some(3));
    }
}
