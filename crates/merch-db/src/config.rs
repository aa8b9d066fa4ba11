//! Ledger configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. Only `DATABASE_URL` is required.
//!
//! ```text
//! DATABASE_URL               postgres://...            (required)
//! DB_MAX_CONNECTIONS         10
//! DB_MIN_CONNECTIONS         1
//! DB_CONNECT_TIMEOUT_SECS    30
//! LEDGER_MAX_RETRIES         10     retries for money-moving operations
//! LEDGER_ATTEMPT_TIMEOUT_MS  0      0 disables the per-attempt bound
//! LEDGER_STARTING_BALANCE    1000
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use merch_core::{DEFAULT_MONEY_RETRIES, DEFAULT_STARTING_BALANCE};

use crate::pool::DbConfig;

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Connection pool settings.
    pub db: DbConfig,

    /// Retry budget for send/buy operations.
    pub max_retries: u32,

    /// Bound on a single money-moving attempt.
    pub attempt_timeout: Option<Duration>,

    /// Coins granted to new accounts.
    pub starting_balance: i64,
}

impl LedgerConfig {
    /// Configuration with defaults for everything except the database URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        LedgerConfig {
            db: DbConfig::new(database_url),
            max_retries: DEFAULT_MONEY_RETRIES,
            attempt_timeout: None,
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("DATABASE_URL".to_string()))?;

        let mut config = LedgerConfig::new(database_url);

        config.db.max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", config.db.max_connections)?;
        config.db.min_connections = parse_or(&lookup, "DB_MIN_CONNECTIONS", config.db.min_connections)?;
        config.db.connect_timeout = Duration::from_secs(parse_or(
            &lookup,
            "DB_CONNECT_TIMEOUT_SECS",
            config.db.connect_timeout.as_secs(),
        )?);

        config.max_retries = parse_or(&lookup, "LEDGER_MAX_RETRIES", config.max_retries)?;

        let attempt_ms: u64 = parse_or(&lookup, "LEDGER_ATTEMPT_TIMEOUT_MS", 0)?;
        config.attempt_timeout = (attempt_ms > 0).then(|| Duration::from_millis(attempt_ms));

        config.starting_balance =
            parse_or(&lookup, "LEDGER_STARTING_BALANCE", config.starting_balance)?;
        if config.starting_balance < 0 {
            return Err(ConfigError::InvalidValue("LEDGER_STARTING_BALANCE".to_string()));
        }

        if config.db.min_connections > config.db.max_connections {
            return Err(ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()));
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
