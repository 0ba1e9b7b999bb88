//! services/dispatcher/src/error.rs
//!
//! Defines the primary error type for the entire dispatcher service.

use crate::config::ConfigError;
use promo_core::ports::PortError;

/// The primary error type for the `dispatcher` service.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error from running the database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Represents a rejected promotion creation or deletion request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
