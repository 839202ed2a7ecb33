//! Configuration management.
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, else `KBGATE_CONFIG_PATH`, else the platform
//!    config dir, e.g. `~/.config/kbgate/config.toml`)
//! 3. A `.env` file in the working directory
//! 4. Environment variables (`BOT_TOKEN`, `ADMIN_ID`, `KBGATE_DATA_DIR`,
//!    `KBGATE_LOG_FORMAT`, `RUST_LOG`)

use crate::models::UserId;
use crate::observability::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "KBGATE_CONFIG_PATH";

/// Default chat API endpoint.
pub const DEFAULT_API_BASE_URL: &str = crate::transport::telegram::DEFAULT_API_BASE_URL;

const DEFAULT_FANOUT_DELAY_MS: u64 = 100;
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Chat API token.
    pub bot_token: SecretString,
    /// The single administrator.
    pub admin_id: UserId,
    /// Base directory for persistent state.
    pub data_dir: PathBuf,
    /// `SQLite` database holding users and search history.
    pub database_path: PathBuf,
    /// Backing document of the knowledge base.
    pub knowledge_path: PathBuf,
    /// Pause between consecutive fan-out sends.
    pub fanout_delay_ms: u64,
    /// Upper bound for a single outbound delivery.
    pub delivery_timeout_secs: u64,
    /// Liveness probe listen address.
    pub health_addr: SocketAddr,
    /// Document watcher period; `0` disables the watcher.
    pub reload_interval_secs: u64,
    /// Chat API endpoint.
    pub api_base_url: String,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or `.env` exists but cannot be
    /// parsed, or the token or administrator id is missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Err(e) if !e.not_found() => {
                return Err(Error::OperationFailed {
                    operation: "read_dotenv".to_string(),
                    cause: e.to_string(),
                });
            },
            _ => {},
        }

        let file = match explicit {
            Some(path) => ConfigFile::read(path)?,
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => ConfigFile::read(Path::new(&path))?,
                None => default_config_path()
                    .filter(|p| p.exists())
                    .map(|p| ConfigFile::read(&p))
                    .transpose()?
                    .unwrap_or_default(),
            },
        };

        file.with_env(|key| std::env::var(key).ok())?.resolve()
    }
}

/// Default config file location for this platform.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "kbgate").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Chat API token.
    pub bot_token: Option<String>,
    /// Administrator id.
    pub admin_id: Option<i64>,
    /// Data directory.
    pub data_dir: Option<PathBuf>,
    /// Database path.
    pub database_path: Option<PathBuf>,
    /// Knowledge document path.
    pub knowledge_path: Option<PathBuf>,
    /// Fan-out delay in milliseconds.
    pub fanout_delay_ms: Option<u64>,
    /// Delivery timeout in seconds.
    pub delivery_timeout_secs: Option<u64>,
    /// Probe listen address.
    pub health_addr: Option<String>,
    /// Watcher period in seconds.
    pub reload_interval_secs: Option<u64>,
    /// Chat API endpoint.
    pub api_base_url: Option<String>,
    /// `[logging]` table.
    pub logging: Option<LoggingConfig>,
}

impl ConfigFile {
    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::parse(&contents)
    }

    /// Parses TOML config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ADMIN_ID` or `KBGATE_LOG_FORMAT` is malformed.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = lookup("BOT_TOKEN") {
            self.bot_token = Some(token);
        }
        if let Some(admin) = lookup("ADMIN_ID") {
            self.admin_id = Some(admin.parse::<UserId>()?.get());
        }
        if let Some(dir) = lookup("KBGATE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = lookup("KBGATE_LOG_FORMAT") {
            self.logging.get_or_insert_with(LoggingConfig::default).format = format.parse::<LogFormat>()?;
        }
        if let Some(filter) = lookup("RUST_LOG") {
            self.logging.get_or_insert_with(LoggingConfig::default).filter = filter;
        }
        Ok(self)
    }

    /// Fills in defaults and validates required values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the token or administrator id is
    /// missing, or the probe address is malformed.
    pub fn resolve(self) -> Result<ServiceConfig> {
        let bot_token = self
            .bot_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput("BOT_TOKEN is not set".to_string()))?;
        let admin_id = self
            .admin_id
            .filter(|id| *id != 0)
            .map(UserId::new)
            .ok_or_else(|| Error::InvalidInput("ADMIN_ID is not set".to_string()))?;

        let data_dir = self.data_dir.unwrap_or_else(|| PathBuf::from("."));
        let database_path = self.database_path.unwrap_or_else(|| data_dir.join("users.db"));
        let knowledge_path = self.knowledge_path.unwrap_or_else(|| data_dir.join("data.kb"));

        let health_addr = self.health_addr.as_deref().unwrap_or(DEFAULT_HEALTH_ADDR);
        let health_addr = health_addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::InvalidInput(format!("health_addr {health_addr}: {e}")))?;

        Ok(ServiceConfig {
            bot_token: SecretString::from(bot_token),
            admin_id,
            data_dir,
            database_path,
            knowledge_path,
            fanout_delay_ms: self.fanout_delay_ms.unwrap_or(DEFAULT_FANOUT_DELAY_MS),
            delivery_timeout_secs: self
                .delivery_timeout_secs
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
            health_addr,
            reload_interval_secs: self
                .reload_interval_secs
                .unwrap_or(DEFAULT_RELOAD_INTERVAL_SECS),
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            logging: self.logging.unwrap_or_default(),
        })
    }
}

impl ServiceConfig {
    /// Fan-out pause as a [`Duration`].
    #[must_use]
    pub const fn fanout_delay(&self) -> Duration {
        Duration::from_millis(self.fanout_delay_ms)
    }

    /// Delivery timeout as a [`Duration`].
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Watcher period as a [`Duration`].
    #[must_use]
    pub const fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }
}
