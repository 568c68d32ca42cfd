//! File-backed configuration with environment overrides for secrets.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use shared_logging::{LogDestination, LogLevel};

use crate::error::{Result, SentoError};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SENTO_";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SentoConfig {
    /// Logging section.
    pub logging: LoggingSettings,
    /// Store connection section.
    pub postgres: PostgresSettings,
    /// Model location.
    pub nlp: NlpSettings,
    /// Polling loop tuning.
    pub processing: ProcessingSettings,
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Minimum level: `DEBUG`, `INFO`, `WARNING` or `ERROR`.
    pub level: String,
    /// `stdout`, `stderr` or a file path.
    pub output: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "INFO".into(),
            output: "stdout".into(),
        }
    }
}

impl LoggingSettings {
    /// Parsed minimum level.
    pub fn level(&self) -> Result<LogLevel> {
        self.level
            .parse()
            .map_err(|err| SentoError::Configuration(format!("logging.level: {err}")))
    }

    /// Parsed destination.
    pub fn destination(&self) -> Result<LogDestination> {
        self.output
            .parse()
            .map_err(|err| SentoError::Configuration(format!("logging.output: {err}")))
    }
}

/// `[postgres]`
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Role name.
    pub user: String,
    /// Role password.
    pub password: String,
    /// Database holding `data.statuses`.
    pub db_name: String,
    /// Pool size.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub acquire_timeout_secs: u64,
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "postgres".into(),
            port: 5432,
            user: "sento".into(),
            password: "sento".into(),
            db_name: "sento".into(),
            max_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

/// `[nlp]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NlpSettings {
    /// Model directory; relative paths resolve against the config file's directory.
    pub model_path: PathBuf,
}

impl Default for NlpSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/sento"),
        }
    }
}

/// `[processing]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Records fetched per batch.
    pub batch_size: usize,
    /// Sleep when no unprocessed records are left.
    pub idle_interval_secs: u64,
    /// Sleep after a store failure.
    pub retry_interval_secs: u64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_interval_secs: 300,
            retry_interval_secs: 30,
        }
    }
}

impl ProcessingSettings {
    /// Idle backoff as a duration.
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    /// Retry backoff as a duration.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl SentoConfig {
    /// Loads `path`, resolves relative paths and applies process environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Loads `path` without consulting the environment.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            SentoError::Configuration(format!("reading {}: {err}", path.display()))
        })?;
        let mut config = Self::from_toml(&raw)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if config.nlp.model_path.is_relative() {
            config.nlp.model_path = base.join(&config.nlp.model_path);
        }
        if let Ok(LogDestination::File(log_path)) = config.logging.destination() {
            if log_path.is_relative() {
                config.logging.output = base.join(log_path).display().to_string();
            }
        }
        Ok(config)
    }

    /// Parses a TOML document and validates it. Paths are left untouched.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides connection secrets and log level from `SENTO_*` variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        if let Some(host) = var("POSTGRES_HOST") {
            self.postgres.host = host;
        }
        if let Some(port) = var("POSTGRES_PORT") {
            self.postgres.port = port.trim().parse().map_err(|_| {
                SentoError::Configuration(format!("{ENV_PREFIX}POSTGRES_PORT: invalid port {port:?}"))
            })?;
        }
        if let Some(user) = var("POSTGRES_USER") {
            self.postgres.user = user;
        }
        if let Some(password) = var("POSTGRES_PASSWORD") {
            self.postgres.password = password;
        }
        if let Some(db_name) = var("POSTGRES_DB_NAME") {
            self.postgres.db_name = db_name;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        self.logging.level()?;
        if self.processing.batch_size == 0 {
            return Err(SentoError::Configuration(
                "processing.batch_size must be positive".into(),
            ));
        }
        if self.postgres.max_connections == 0 {
            return Err(SentoError::Configuration(
                "postgres.max_connections must be positive".into(),
            ));
        }
        Ok(())
    }
}
