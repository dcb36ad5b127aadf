//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::api::ApiConfig;
use crate::auth::OAuthConfig;
use crate::realtime::HubConfig;
use crate::storage::StorageConfig as StoreConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL, used to build the OAuth redirect target
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Mark session cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            site_url: default_site_url(),
            secure_cookies: false,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("smartmark").join("smartmark.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./smartmark_data/smartmark.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// OAuth provider and session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,

    #[serde(default = "default_scopes")]
    pub scopes: String,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_sweep_interval")]
    pub session_sweep_minutes: u64,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_authorize_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}

fn default_scopes() -> String {
    "openid email profile".to_string()
}

fn default_session_ttl() -> i64 {
    24 * 7 // one week
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
            scopes: default_scopes(),
            session_ttl_hours: default_session_ttl(),
            session_sweep_minutes: default_sweep_interval(),
        }
    }
}

/// Realtime hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    1000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("smartmark").join("config.toml")),
            Some(PathBuf::from("/etc/smartmark/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(host) = std::env::var("SMARTMARK_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SMARTMARK_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(site_url) = std::env::var("SMARTMARK_SITE_URL") {
            if !site_url.is_empty() {
                self.server.site_url = site_url;
            }
        }
        if let Ok(secure) = std::env::var("SMARTMARK_SECURE_COOKIES") {
            self.server.secure_cookies = secure.to_lowercase() == "true" || secure == "1";
        }

        // Storage overrides
        if let Ok(path) = std::env::var("SMARTMARK_DATABASE") {
            self.storage.database_path = path;
        }

        // OAuth overrides
        if let Ok(client_id) = std::env::var("SMARTMARK_OAUTH_CLIENT_ID") {
            self.auth.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("SMARTMARK_OAUTH_CLIENT_SECRET") {
            self.auth.client_secret = client_secret;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("SMARTMARK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SMARTMARK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Settings for the HTTP layer
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            site_url: self.server.site_url.trim_end_matches('/').to_string(),
            secure_cookies: self.server.secure_cookies,
            session_ttl: chrono::Duration::hours(self.auth.session_ttl_hours),
            provider_label: provider_label(&self.auth.provider),
        }
    }

    /// Settings for the store
    pub fn store_config(&self) -> StoreConfig {
        if self.storage.database_path == ":memory:" {
            StoreConfig::in_memory()
        } else {
            StoreConfig::new(expand_home(&self.storage.database_path))
        }
    }

    /// Settings for the OAuth client
    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            provider: self.auth.provider.clone(),
            client_id: self.auth.client_id.clone(),
            client_secret: self.auth.client_secret.clone(),
            authorize_url: self.auth.authorize_url.clone(),
            token_url: self.auth.token_url.clone(),
            userinfo_url: self.auth.userinfo_url.clone(),
            scopes: self.auth.scopes.clone(),
        }
    }

    /// Settings for the realtime hub
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.realtime.max_connections,
        }
    }

    /// How often expired sessions are purged
    pub fn session_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auth.session_sweep_minutes.max(1) * 60)
    }
}

/// Resolve a leading `~/` against the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// "google" → "Google"
fn provider_label(provider: &str) -> String {
    let mut chars = provider.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    let database_path = toml::Value::String(default_database_path());

    format!(
        r#"# Smartmark Configuration
#
# Environment variables override these settings:
# - SMARTMARK_HOST
# - SMARTMARK_PORT
# - SMARTMARK_SITE_URL
# - SMARTMARK_SECURE_COOKIES
# - SMARTMARK_DATABASE
# - SMARTMARK_OAUTH_CLIENT_ID
# - SMARTMARK_OAUTH_CLIENT_SECRET
# - SMARTMARK_LOG_LEVEL
# - SMARTMARK_LOG_FORMAT

[server]
# Address to bind
host = "0.0.0.0"
port = 3000

# Public URL of this site; the OAuth redirect goes to {{site_url}}/auth/callback
site_url = "http://localhost:3000"

# Set to true when served over HTTPS
secure_cookies = false

[storage]
# SQLite database file (":memory:" for a throwaway database)
database_path = {database_path}

[auth]
# OAuth 2.0 provider (defaults target Google)
provider = "google"
client_id = ""
client_secret = ""
authorize_url = "https://accounts.google.com/o/oauth2/v2/auth"
token_url = "https://oauth2.googleapis.com/token"
userinfo_url = "https://openidconnect.googleapis.com/v1/userinfo"
scopes = "openid email profile"

# Session lifetime (hours)
session_ttl_hours = 168

# How often expired sessions are purged (minutes)
session_sweep_minutes = 30

[realtime]
# Maximum concurrent websocket connections
max_connections = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    )
}
