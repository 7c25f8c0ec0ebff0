//! Migrator configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::NamingConvention;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::ledger::{DEFAULT_TABLE_PREFIX, LedgerKind};

/// Default migrations directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Settings that select how the engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct MigratorConfig {
    /// Database engine of the connection.
    pub dialect: Dialect,
    /// Where the ledger is stored.
    pub ledger: LedgerKind,
    /// Prefix of the ledger tables.
    pub table_prefix: String,
    /// Directory containing migration files.
    pub migrations_dir: PathBuf,
    /// Directory for the document ledger; defaults to `migrations_dir`.
    pub document_dir: Option<PathBuf>,
    /// How rollback files are paired with migrations.
    pub naming: NamingConvention,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            ledger: LedgerKind::Db,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            document_dir: None,
            naming: NamingConvention::Suffix,
        }
    }
}

impl MigratorConfig {
    /// Creates a configuration for `dialect` with defaults for everything else.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Sets the ledger storage kind.
    #[must_use]
    pub const fn ledger(mut self, ledger: LedgerKind) -> Self {
        self.ledger = ledger;
        self
    }

    /// Sets the ledger table prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the migrations directory.
    #[must_use]
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Sets the document ledger directory.
    #[must_use]
    pub fn document_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.document_dir = Some(dir.into());
        self
    }

    /// Sets the naming convention.
    #[must_use]
    pub const fn naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    /// Returns the directory holding the ledger documents.
    #[must_use]
    pub fn resolved_document_dir(&self) -> PathBuf {
        self.document_dir
            .clone()
            .unwrap_or_else(|| self.migrations_dir.clone())
    }

    /// Checks settings that would otherwise fail half way through a run.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.table_prefix) {
            return Err(MigrateError::InvalidTablePrefix(self.table_prefix.clone()));
        }
        Ok(())
    }
}

/// The prefix is interpolated into SQL, so only plain identifiers are allowed.
fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
