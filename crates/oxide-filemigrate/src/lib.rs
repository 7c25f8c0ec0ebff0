//! File-based SQL migrations for Rust.
//!
//! `oxide-filemigrate` applies plain `.sql` files from a directory in file
//! name order and records what it did in a ledger:
//! - Files applied by one run form a batch that is rolled back together
//! - Each migration may have a `-rollback.sql` companion that reverts it
//! - Every attempt is recorded in an audit report, success or failure
//! - Applied files are checksummed so later edits can be detected
//!
//! # Architecture
//!
//! - **Catalog** - Lists migration files and pairs them with rollback files
//! - **Splitter** - Cuts a file into statements, keeping routine bodies whole
//! - **Ledger** - Applied migrations and reports, in tables or JSON documents
//! - **Migrator** - Runs migrate, rollback, refresh, report and validation
//! - **Dialect** - Placeholder syntax and ledger DDL per database engine
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oxide_filemigrate::prelude::*;
//! use sqlx::sqlite::SqlitePoolOptions;
//!
//! let pool = SqlitePoolOptions::new()
//!     .max_connections(1)
//!     .connect("sqlite:app.db")
//!     .await?;
//!
//! let config = MigratorConfig::new(Dialect::Sqlite).migrations_dir("migrations");
//! let migrator = Migrator::from_config(Arc::new(pool), &config)?;
//! migrator.init().await?;
//!
//! let applied = migrator.migrate(0).await?;
//! let reverted = migrator.rollback(0, RollbackScope::LatestBatch).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create an empty migration and its rollback file
//! oxide-filemigrate add create-users
//!
//! # Apply pending migrations
//! oxide-filemigrate migrate
//!
//! # Roll back the latest batch
//! oxide-filemigrate rollback
//!
//! # Detect edited or deleted migration files
//! oxide-filemigrate validate
//! ```

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod events;
pub mod ledger;
pub mod migrator;
pub mod splitter;

pub use error::{MigrateError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{MigrationCatalog, MigrationFile, NamingConvention};
    pub use crate::config::MigratorConfig;
    pub use crate::connection::{Connection, SqlValue};
    pub use crate::dialect::Dialect;
    pub use crate::error::{MigrateError, Result};
    pub use crate::events::MigrationEvent;
    pub use crate::ledger::{
        Batch, DocumentLedger, Ledger, LedgerEntry, LedgerKind, ReportEntry, TableLedger,
    };
    pub use crate::migrator::{Migrator, RefreshSummary, RollbackScope};
    pub use crate::splitter::StatementSplitter;
}
