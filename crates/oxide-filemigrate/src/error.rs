//! Error types for the migration engine.

use std::path::PathBuf;

/// Errors that can occur while migrating, rolling back or reading the ledger.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Database error raised by one of the bundled sqlx connections.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Error raised by a caller-supplied connection implementation.
    #[error("Driver error: {0}")]
    Driver(String),

    /// IO error (reading migration files or ledger documents).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error in a ledger document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The paired rollback file for a migration does not exist.
    #[error("Rollback file '{rollback}' for migration '{migration}' does not exist")]
    RollbackNotFound {
        /// The migration being rolled back.
        migration: String,
        /// The rollback file name that was looked up.
        rollback: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// The dialect tag is not one of the supported engines.
    #[error("Unknown dialect '{0}' (expected sqlite, postgres, mysql or firebird)")]
    UnknownDialect(String),

    /// The ledger storage kind is not supported.
    #[error("Unknown ledger kind '{0}' (expected db or json)")]
    UnknownLedgerKind(String),

    /// The table prefix is not a plain SQL identifier.
    #[error("Invalid table prefix '{0}'")]
    InvalidTablePrefix(String),

    /// Invalid ledger state.
    #[error("Invalid ledger state: {0}")]
    InvalidState(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
