//! Explicit process configuration.
//!
//! # Responsibility
//! - Collect every startup setting into one value passed to constructors.
//! - Read settings from the environment at the process edge only.
//!
//! # Invariants
//! - Core components never read environment variables themselves.

use crate::logging::default_log_level;
use crate::model::step::OwnerId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "NEXTSTEP_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "NEXTSTEP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NEXTSTEP_LOG_DIR";
pub const ENV_DEFAULT_OWNER: &str = "NEXTSTEP_DEFAULT_OWNER";

const DEFAULT_DB_FILE_NAME: &str = "sqlite.db";
const DEFAULT_LOG_DIR_NAME: &str = "logs";
const DEFAULT_OWNER: OwnerId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but cannot be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// Working directory is needed for a default and cannot be resolved.
    WorkingDirectory(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid value `{value}` for {key}: {reason}")
            }
            Self::WorkingDirectory(message) => {
                write!(f, "cannot resolve working directory: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Startup settings for the step store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
    /// Owner assigned to the steps seeded into a new store.
    pub default_owner: OwnerId,
}

impl CoreConfig {
    /// Builds configuration with defaults rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            db_path: base_dir.join(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: base_dir.join(DEFAULT_LOG_DIR_NAME),
            default_owner: DEFAULT_OWNER,
        }
    }

    /// Reads configuration from process environment variables.
    ///
    /// Unset variables fall back to defaults under the working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|err| ConfigError::WorkingDirectory(err.to_string()))?;
        Self::from_lookup(cwd, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(
        base_dir: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let base_dir = base_dir.into();
        let mut config = Self::with_base_dir(&base_dir);
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read(ENV_DB_PATH) {
            config.db_path = base_dir.join(value.trim());
        }
        if let Some(value) = read(ENV_LOG_LEVEL) {
            config.log_level = value.trim().to_string();
        }
        if let Some(value) = read(ENV_LOG_DIR) {
            config.log_dir = base_dir.join(value.trim());
        }
        if let Some(value) = read(ENV_DEFAULT_OWNER) {
            config.default_owner = parse_owner(&value)?;
        }
        Ok(config)
    }
}

fn parse_owner(value: &str) -> Result<OwnerId, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: ENV_DEFAULT_OWNER,
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let owner: OwnerId = value
        .trim()
        .parse()
        .map_err(|_| invalid("expected an integer"))?;
    if owner <= 0 {
        return Err(invalid("owner id must be positive"));
    }
    Ok(owner)
}
