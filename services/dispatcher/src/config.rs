//! services/dispatcher/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub log_level: Level,
    /// Base URL of the Whapi-style messaging gateway.
    pub whapi_api_url: String,
    /// Bearer token for the messaging gateway.
    pub whapi_api_token: String,
    /// Fixed rate of the dispatch tick.
    pub dispatch_interval: Duration,
    /// Upper bound on a single gateway send call.
    pub send_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Database and Logging Settings ---
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Messaging Gateway Settings ---
        let whapi_api_url = std::env::var("WHAPI_API_URL")
            .map_err(|_| ConfigError::MissingVar("WHAPI_API_URL".to_string()))?;
        let whapi_api_token = std::env::var("WHAPI_API_TOKEN")
            .map_err(|_| ConfigError::MissingVar("WHAPI_API_TOKEN".to_string()))?;

        // --- Load Scheduler Settings ---
        let dispatch_interval = parse_secs("DISPATCH_INTERVAL_SECS", 60)?;
        let send_timeout = parse_secs("SEND_TIMEOUT_SECS", 30)?;

        Ok(Self {
            database_url,
            log_level,
            whapi_api_url,
            whapi_api_token,
            dispatch_interval,
            send_timeout,
        })
    }
}

/// Reads an optional whole-seconds duration variable with a default.
fn parse_secs(var: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => {
            let secs = raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    var.to_string(),
                    format!("'{}' is not a whole number of seconds", raw),
                )
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue(
                    var.to_string(),
                    "must be at least one second".to_string(),
                ));
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
