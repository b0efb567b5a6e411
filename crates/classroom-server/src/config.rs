//! Server configuration loading from file and environment variables.

use classroom_types::AppKind;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which app this process serves, and where its uploads go.
    #[serde(default)]
    pub app: AppConfig,

    /// Default admin account seeded at startup.
    #[serde(default)]
    pub seed: SeedConfig,

    /// Login session lifetime.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. When unset, the app's own default
    /// file name is used (see [`AppKind::default_db_path`]).
    #[serde(default)]
    pub path: Option<String>,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "classroom_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_kind")]
    pub kind: AppKind,

    /// Directory that receives uploaded files, served under `/uploads`.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Largest accepted upload request, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

/// Login session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Seconds a login stays valid. 0 keeps sessions until logout.
    #[serde(default = "default_session_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_kind() -> AppKind {
    AppKind::Items
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_session_ttl_seconds() -> u64 {
    crate::DEFAULT_SESSION_TTL_SECS
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@example.com".to_string()
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            admin_username: default_admin_username(),
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl_seconds(),
        }
    }
}

impl Config {
    /// The database file for the configured app.
    pub fn db_path(&self) -> String {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.app.kind.default_db_path().to_string())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// `CLASSROOM_APP` does not name a known app.
    #[error("invalid CLASSROOM_APP: {0}")]
    AppKind(#[from] classroom_types::ParseEnumError),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CLASSROOM_HOST` overrides `server.host`
/// - `CLASSROOM_PORT` overrides `server.port`
/// - `CLASSROOM_DB_PATH` overrides `database.path`
/// - `CLASSROOM_LOG_LEVEL` overrides `logging.level`
/// - `CLASSROOM_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CLASSROOM_APP` overrides `app.kind`
/// - `CLASSROOM_UPLOAD_DIR` overrides `app.upload_dir`
/// - `CLASSROOM_ADMIN_PASSWORD` overrides `seed.admin_password`
/// - `CLASSROOM_SESSION_TTL_SECONDS` overrides `session.ttl_seconds`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if `CLASSROOM_APP` names an unknown app.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn apply_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = var("CLASSROOM_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("CLASSROOM_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("CLASSROOM_DB_PATH") {
        config.database.path = Some(db_path);
    }
    if let Some(level) = var("CLASSROOM_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CLASSROOM_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(kind) = var("CLASSROOM_APP") {
        config.app.kind = kind.trim().parse()?;
    }
    if let Some(dir) = var("CLASSROOM_UPLOAD_DIR") {
        config.app.upload_dir = dir;
    }
    if let Some(password) = var("CLASSROOM_ADMIN_PASSWORD") {
        config.seed.admin_password = password;
    }
    if let Some(ttl) = var("CLASSROOM_SESSION_TTL_SECONDS") {
        if let Ok(parsed) = ttl.trim().parse() {
            config.session.ttl_seconds = parsed;
        }
    }
    Ok(())
}
