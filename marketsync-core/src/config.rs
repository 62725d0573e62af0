//! Configuration loaded from `marketsync.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Credentials are read from the environment when the file leaves them out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::ident::{Ident, InvalidIdent};

pub const DEFAULT_CONFIG_FILE: &str = "marketsync.toml";

pub const ENV_DB_USER: &str = "POSTGRES_DB_USERNAME";
pub const ENV_DB_PASSWORD: &str = "POSTGRES_DB_PASSWORD";
pub const ENV_ACCESS_TOKEN: &str = "MARKETSYNC_ACCESS_TOKEN";

/// Most symbols the market-data API accepts in one request.
pub const MAX_SYMBOLS_PER_REQUEST: usize = 500;

/// Upper bound on retries per market-data request.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdent),

    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub feed: FeedConfig,
}

impl Config {
    /// Load `path`, or the defaults when no path is given, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Fill unset credentials from `lookup`. Values already present in the
    /// file win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.database.user.is_none() {
            self.database.user = lookup(ENV_DB_USER);
        }
        if self.database.password.is_none() {
            self.database.password = lookup(ENV_DB_PASSWORD);
        }
        if self.feed.access_token.is_none() {
            self.feed.access_token = lookup(ENV_ACCESS_TOKEN);
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "investment_advise_platform".to_string(),
            user: None,
            password: None,
            schema: "ods".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let user = self
            .user
            .as_deref()
            .ok_or(ConfigError::MissingCredential(ENV_DB_USER))?;
        let password = self
            .password
            .as_deref()
            .ok_or(ConfigError::MissingCredential(ENV_DB_PASSWORD))?;
        Ok((user, password))
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub staging_prefix: String,
    pub snapshot_table: String,
    pub snapshot_id_column: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staging_prefix: "stg_".to_string(),
            snapshot_table: "snapshot".to_string(),
            snapshot_id_column: "id".to_string(),
        }
    }
}

impl SyncConfig {
    /// Validated identifiers for the engine.
    pub fn settings(&self) -> Result<SyncSettings, ConfigError> {
        Ok(SyncSettings {
            staging_prefix: Ident::checked(&self.staging_prefix)?,
            snapshot_table: Ident::checked(&self.snapshot_table)?,
            snapshot_id_column: Ident::checked(&self.snapshot_id_column)?,
        })
    }
}

/// Names the engine splices into statements, all validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub staging_prefix: Ident,
    pub snapshot_table: Ident,
    pub snapshot_id_column: Ident,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            staging_prefix: Ident::from_catalog("stg_"),
            snapshot_table: Ident::from_catalog("snapshot"),
            snapshot_id_column: Ident::from_catalog("id"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub max_symbols_per_request: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub access_token: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.schwabapi.com/marketdata/v1".to_string(),
            max_symbols_per_request: MAX_SYMBOLS_PER_REQUEST,
            timeout_secs: 30,
            max_retries: 3,
            access_token: None,
        }
    }
}

impl FeedConfig {
    /// Configured chunk size, clamped to 1..=500.
    pub fn symbols_per_request(&self) -> usize {
        self.max_symbols_per_request.clamp(1, MAX_SYMBOLS_PER_REQUEST)
    }

    /// Configured retry count, capped at `MAX_RETRIES`.
    pub fn retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES)
    }
}

impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConfig")
            .field("base_url", &self.base_url)
            .field("max_symbols_per_request", &self.max_symbols_per_request)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}
