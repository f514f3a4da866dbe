//! Configuration management for Podrelay

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "PODRELAY_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub endpoints: ApiEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/podrelay/podrelay.db".to_string(),
        }
    }
}

/// Durations are written as humantime strings ("1h", "90s", "1500ms")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub check_interval: String,
    pub run_timeout: String,
    pub platform_timeout: String,
    pub max_retries: u32,
    pub retry_base_delay: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            check_interval: "1h".to_string(),
            run_timeout: "60s".to_string(),
            platform_timeout: "20s".to_string(),
            max_retries: 2,
            retry_base_delay: "1s".to_string(),
        }
    }
}

impl AutomationConfig {
    pub fn check_interval(&self) -> Result<Duration> {
        parse_duration("automation.check_interval", &self.check_interval)
    }

    pub fn run_timeout(&self) -> Result<Duration> {
        parse_duration("automation.run_timeout", &self.run_timeout)
    }

    pub fn platform_timeout(&self) -> Result<Duration> {
        parse_duration("automation.platform_timeout", &self.platform_timeout)
    }

    pub fn retry_base_delay(&self) -> Result<Duration> {
        parse_duration("automation.retry_base_delay", &self.retry_base_delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub max_entries_per_day: usize,
    pub retention_days: u32,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_entries_per_day: 100,
            retention_days: 7,
        }
    }
}

/// Recipients of the failure summary sent after a run with failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    pub email: Option<String>,
    pub sms: Option<String>,
}

/// Email/SMS relay; without a URL notifications only go to the log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Http,
}

/// Where generated title cards are published
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub path: String,
    pub public_base_url: Option<String>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Local,
            path: "~/.local/share/podrelay/media".to_string(),
            public_base_url: None,
            endpoint: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// YouTube Data API, then the source platforms' RSS feeds
    #[default]
    Auto,
    /// Episodes listed in a local JSON file
    Static,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub episodes_file: Option<String>,
}

/// Base URLs of the platform APIs
///
/// Overridable so integration tests can point adapters at a local server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEndpoints {
    pub twitter: String,
    pub facebook: String,
    pub linkedin: String,
    pub instagram: String,
    pub threads: String,
    pub bluesky: String,
    pub youtube: String,
    pub spotify_accounts: String,
    pub spotify_api: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            twitter: "https://api.x.com".to_string(),
            facebook: "https://graph.facebook.com/v19.0".to_string(),
            linkedin: "https://api.linkedin.com".to_string(),
            instagram: "https://graph.facebook.com/v19.0".to_string(),
            threads: "https://graph.threads.net/v1.0".to_string(),
            bluesky: "https://bsky.social".to_string(),
            youtube: "https://www.googleapis.com/youtube/v3".to_string(),
            spotify_accounts: "https://accounts.spotify.com".to_string(),
            spotify_api: "https://api.spotify.com".to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Every endpoint pointed at one base URL
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            twitter: base.clone(),
            facebook: base.clone(),
            linkedin: base.clone(),
            instagram: base.clone(),
            threads: base.clone(),
            bluesky: base.clone(),
            youtube: base.clone(),
            spotify_accounts: base.clone(),
            spotify_api: base,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse as TOML but cannot drive a run
    pub fn validate(&self) -> Result<()> {
        let interval = self.automation.check_interval()?;
        let run_timeout = self.automation.run_timeout()?;
        self.automation.platform_timeout()?;
        self.automation.retry_base_delay()?;

        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "automation.check_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if run_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "automation.run_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.logs.max_entries_per_day == 0 {
            return Err(ConfigError::InvalidValue {
                field: "logs.max_entries_per_day".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.storage.kind == StorageKind::Http && self.storage.endpoint.is_none() {
            return Err(ConfigError::MissingField("storage.endpoint".to_string()).into());
        }
        if self.source.kind == SourceKind::Static && self.source.episodes_file.is_none() {
            return Err(ConfigError::MissingField("source.episodes_file".to_string()).into());
        }
        Ok(())
    }

    /// Database path with `~` expanded
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.database.path).to_string()
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a duration: {}", value, e),
        }
        .into()
    })
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("podrelay").join("config.toml"))
}
