//! Configuration management for Gramcast
//!
//! Non-secret settings live in `config.toml`. Every section is optional and
//! falls back to the values the publishing scripts have always used, so a
//! missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default = "PollConfig::publish_default")]
    pub publish: PollConfig,
    #[serde(default = "PollConfig::reels_default")]
    pub reels: PollConfig,
    #[serde(default = "PollConfig::stories_default")]
    pub stories: PollConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
        }
    }
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

/// Fixed-interval retry settings for one call site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub attempts: u32,
    /// humantime duration, e.g. "10s"
    pub interval: String,
}

impl PollConfig {
    pub fn publish_default() -> Self {
        Self {
            attempts: 5,
            interval: "10s".to_string(),
        }
    }

    /// 30 x 10s keeps the five minute processing bound
    pub fn reels_default() -> Self {
        Self {
            attempts: 30,
            interval: "10s".to_string(),
        }
    }

    pub fn stories_default() -> Self {
        Self {
            attempts: 30,
            interval: "2s".to_string(),
        }
    }

    /// Convert into a retry policy, validating the interval string
    pub fn policy(&self, field: &str) -> Result<RetryPolicy> {
        let interval = parse_duration(field, &self.interval)?;
        if self.attempts == 0 {
            return Err(ConfigError::MissingField(format!("{}.attempts must be at least 1", field)).into());
        }
        Ok(RetryPolicy::new(self.attempts, interval))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Where the last-known token status is written
    #[serde(default = "default_status_file")]
    pub status_file: String,
    /// Refresh when this many days or fewer remain
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_days: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            refresh_threshold_days: default_refresh_threshold(),
        }
    }
}

impl TokenConfig {
    pub fn expand_status_file(&self) -> PathBuf {
        expand_path(&self.status_file)
    }
}

fn default_status_file() -> String {
    "~/.local/share/gramcast/token_info.json".to_string()
}

fn default_refresh_threshold() -> i64 {
    7
}

/// Where the authoritative secrets live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// A dotenv file, rewritten in place on token refresh
    #[default]
    EnvFile,
    /// The OS keyring (service "gramcast")
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default = "default_env_file")]
    pub env_file: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            env_file: default_env_file(),
        }
    }
}

impl CredentialsConfig {
    pub fn expand_env_file(&self) -> PathBuf {
        expand_path(&self.env_file)
    }
}

fn default_env_file() -> String {
    ".env".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_cloud_name")]
    pub cloud_name: String,
    #[serde(default = "default_upload_base_url")]
    pub base_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            cloud_name: default_cloud_name(),
            base_url: default_upload_base_url(),
        }
    }
}

fn default_cloud_name() -> String {
    String::new()
}

fn default_upload_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            graph: GraphConfig::default(),
            publish: PollConfig::publish_default(),
            reels: PollConfig::reels_default(),
            stories: PollConfig::stories_default(),
            token: TokenConfig::default(),
            credentials: CredentialsConfig::default(),
            upload: UploadConfig::default(),
        }
    }

    /// Check every duration parses and every bound is usable
    pub fn validate(&self) -> Result<()> {
        self.publish.policy("publish")?;
        self.reels.policy("reels")?;
        self.stories.policy("stories")?;
        if self.token.refresh_threshold_days < 0 {
            return Err(ConfigError::MissingField(
                "token.refresh_threshold_days must not be negative".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Versioned API root, e.g. `https://graph.facebook.com/v18.0`
    pub fn graph_root(&self) -> String {
        format!(
            "{}/{}",
            self.graph.base_url.trim_end_matches('/'),
            self.graph.api_version.trim_matches('/')
        )
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("GRAMCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("gramcast").join("config.toml"))
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|_| {
        ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}
