use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{Context, OptionExt};
use serde::{Deserialize, Serialize};

use crate::services::sync::resolver::DEFAULT_CONCURRENCY;
use crate::transport::TransportConfig;

const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1/";
const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com/";
const DEFAULT_REDIRECT_URI: &str = "https://www.google.co.in/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_sources_directory")]
    sources_directory: String,
    /// Leading non-data rows in every source file
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub resolver: ResolverSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_accounts_base_url")]
    pub accounts_base_url: String,
    /// Whether newly created playlists are public
    #[serde(default = "default_true")]
    pub public_playlists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f32,
    #[serde(default = "default_unit_ms")]
    pub backoff_unit_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_unit_ms")]
    pub rate_limit_unit_ms: u64,
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_sources_directory() -> String {
    ".".to_string()
}

fn default_header_rows() -> usize {
    3
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_accounts_base_url() -> String {
    DEFAULT_ACCOUNTS_BASE_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_backoff_base() -> f32 {
    2.0
}

fn default_unit_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_retry_after_secs() -> u64 {
    5
}

fn default_max_rate_limit_retries() -> u32 {
    10
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            redirect_uri: default_redirect_uri(),
            api_base_url: default_api_base_url(),
            accounts_base_url: default_accounts_base_url(),
            public_playlists: true,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            backoff_base: default_backoff_base(),
            backoff_unit_ms: default_unit_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            rate_limit_unit_ms: default_unit_ms(),
            default_retry_after_secs: default_retry_after_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            requests_per_second: None,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources_directory: default_sources_directory(),
            header_rows: default_header_rows(),
            spotify: SpotifyConfig::default(),
            transport: TransportSettings::default(),
            resolver: ResolverSettings::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("chart-sync").join("config.toml"))
    }

    /// Load the default config file, falling back to built-in defaults when it doesn't exist
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write a default config file, if it doesn't exist
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("No config directory available")?;
        if path.exists() {
            tracing::info!("Config file already exists at {}", path.display());
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get expanded sources directory path
    pub fn sources_directory(&self) -> PathBuf {
        self.expand_path(&self.sources_directory)
    }

    pub fn client_id(&self) -> Option<String> {
        self.spotify
            .client_id
            .clone()
            .or_else(|| std::env::var("SPOTIFY_CLIENT_ID").ok())
    }

    pub fn client_secret(&self) -> Option<String> {
        self.spotify
            .client_secret
            .clone()
            .or_else(|| std::env::var("SPOTIFY_CLIENT_SECRET").ok())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.spotify
            .refresh_token
            .clone()
            .or_else(|| std::env::var("SPOTIFY_REFRESH_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }

    pub fn transport_config(&self) -> TransportConfig {
        let settings = &self.transport;
        TransportConfig {
            max_attempts: settings.max_attempts.max(1),
            timeout: Duration::from_secs(settings.timeout_secs),
            backoff_base: settings.backoff_base,
            backoff_unit: Duration::from_millis(settings.backoff_unit_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
            rate_limit_unit: Duration::from_millis(settings.rate_limit_unit_ms),
            default_retry_after_secs: settings.default_retry_after_secs,
            max_rate_limit_retries: settings.max_rate_limit_retries,
            requests_per_second: settings.requests_per_second,
        }
    }
}
