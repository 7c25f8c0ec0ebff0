//! Migration orchestration.
//!
//! The [`Migrator`] ties the catalog, splitter, connection and ledger
//! together. It keeps no state between calls: every run creates its own
//! [`Batch`] and passes it down explicitly.
//!
//! Each statement of a file runs in its own transaction. A file is not atomic:
//! if its third statement fails, the first two stay committed and the file is
//! not recorded, so a retry runs the whole file again. Migration files should
//! therefore be safe to repeat (`IF NOT EXISTS` and friends).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{MigrationCatalog, MigrationFile};
use crate::checksum::{checksum, file_checksum};
use crate::config::MigratorConfig;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::events::{EventDispatcher, MigrationEvent};
use crate::ledger::{self, Batch, Ledger, LedgerEntry, LedgerOptions};
use crate::splitter::StatementSplitter;

/// Which ledger entries a rollback considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackScope {
    /// Only the most recently applied batch.
    LatestBatch,
    /// Every active entry.
    All,
}

/// Outcome of [`Migrator::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Ledger entries visited by the full rollback.
    pub rolled_back: usize,
    /// Files applied by the following migrate.
    pub migrated: usize,
}

/// Applies and rolls back migration files.
pub struct Migrator {
    connection: Arc<dyn Connection>,
    ledger: Box<dyn Ledger>,
    catalog: MigrationCatalog,
    splitter: StatementSplitter,
    events: EventDispatcher,
}

impl Migrator {
    /// Creates a migrator from its parts.
    pub fn new(
        connection: Arc<dyn Connection>,
        dialect: Dialect,
        ledger: Box<dyn Ledger>,
        catalog: MigrationCatalog,
    ) -> Self {
        Self {
            connection,
            ledger,
            catalog,
            splitter: StatementSplitter::new(dialect),
            events: EventDispatcher::new(),
        }
    }

    /// Creates a migrator from validated configuration.
    pub fn from_config(connection: Arc<dyn Connection>, config: &MigratorConfig) -> Result<Self> {
        config.validate()?;

        let ledger = ledger::open(LedgerOptions {
            kind: config.ledger,
            connection: Arc::clone(&connection),
            dialect: config.dialect,
            table_prefix: config.table_prefix.clone(),
            document_dir: config.resolved_document_dir(),
        });
        let catalog = MigrationCatalog::new(&config.migrations_dir).naming(config.naming);

        Ok(Self::new(connection, config.dialect, ledger, catalog))
    }

    /// Registers a listener for progress events.
    pub fn on_event(&mut self, listener: impl Fn(&MigrationEvent) + Send + Sync + 'static) {
        self.events.register(Box::new(listener));
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Returns the catalog.
    #[must_use]
    pub const fn catalog(&self) -> &MigrationCatalog {
        &self.catalog
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.splitter.dialect()
    }

    /// Ensures the ledger storage exists.
    ///
    /// The migrations directory must already exist; it is never created here,
    /// even when the document ledger lives inside it.
    pub async fn init(&self) -> Result<()> {
        let dir = self.catalog.dir();
        if !tokio::fs::metadata(dir).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(MigrateError::MigrationsDirNotFound(dir.to_path_buf()));
        }
        self.ledger.ensure_schema().await?;
        info!(ledger = %self.ledger.kind(), "Migration ledger ready");
        Ok(())
    }

    /// Applies up to `count` pending migrations (`0` applies all of them).
    ///
    /// Returns the number of files applied. All files applied by one call
    /// share a batch and are rolled back together.
    pub async fn migrate(&self, count: usize) -> Result<usize> {
        self.migrate_in_batch(count, Batch::now()).await
    }

    /// Same as [`migrate`](Self::migrate) with an explicit batch.
    pub async fn migrate_in_batch(&self, count: usize, batch: Batch) -> Result<usize> {
        let files = self.catalog.ordered_files().await?;

        let mut migrated = 0;
        for file in &files {
            if count > 0 && migrated == count {
                break;
            }
            if self.apply_file(&batch, &file.name).await? {
                migrated += 1;
            }
        }

        self.events.dispatch(&MigrationEvent::Migrated(migrated));
        Ok(migrated)
    }

    /// Rolls back up to `count` ledger entries (`0` for no limit) in
    /// descending file name order.
    ///
    /// `count` limits visited entries, including entries skipped because they
    /// have no rollback file. Skipped entries are soft-deleted as well so the
    /// ledger matches the intent of the rollback.
    pub async fn rollback(&self, count: usize, scope: RollbackScope) -> Result<usize> {
        let batch = Batch::now();
        let entries = self
            .ledger
            .active_entries(scope == RollbackScope::LatestBatch)
            .await?;

        if entries.is_empty() {
            self.events.dispatch(&MigrationEvent::NothingToRollback);
            return Ok(0);
        }

        let mut rolled_back = 0;
        for entry in &entries {
            if count > 0 && rolled_back == count {
                break;
            }
            self.rollback_entry(&batch, entry).await?;
            rolled_back += 1;
        }

        self.events.dispatch(&MigrationEvent::RolledBack(rolled_back));
        Ok(rolled_back)
    }

    /// Rolls back every applied migration, then applies all migrations again.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let rolled_back = self.rollback(0, RollbackScope::All).await?;
        let migrated = self.migrate(0).await?;
        Ok(RefreshSummary {
            rolled_back,
            migrated,
        })
    }

    /// Returns the rendered audit report.
    pub async fn report(&self) -> Result<String> {
        self.ledger.render_report().await
    }

    /// Compares every applied file against its recorded checksum.
    ///
    /// Returns one message per missing or modified file; an empty list means
    /// everything matches. Problems are collected, never raised.
    pub async fn checksum_validation(&self) -> Vec<String> {
        let entries = match self.ledger.active_entries(false).await {
            Ok(entries) => entries,
            Err(e) => return vec![e.to_string()],
        };

        let mut findings = Vec::new();
        for entry in entries {
            if !self.catalog.exists(&entry.file_name).await {
                findings.push(format!(
                    "migration file {} for checksum does not exist",
                    entry.file_name
                ));
                continue;
            }

            match file_checksum(&self.catalog.path(&entry.file_name)).await {
                Ok(actual) if actual == entry.checksum => {}
                Ok(actual) => findings.push(format!(
                    "checksum mismatch for file {}, recorded {} but found {}",
                    entry.file_name, entry.checksum, actual
                )),
                Err(e) => findings.push(format!(
                    "migration file {} for checksum could not be read: {e}",
                    entry.file_name
                )),
            }
        }

        for finding in &findings {
            warn!(finding = %finding, "Checksum validation failed");
        }
        findings
    }

    /// Returns catalog files that have no active ledger entry.
    pub async fn pending(&self) -> Result<Vec<MigrationFile>> {
        let mut pending = Vec::new();
        for file in self.catalog.ordered_files().await? {
            if !self.ledger.is_applied(&file.name).await? {
                pending.push(file);
            }
        }
        Ok(pending)
    }

    /// Returns every active ledger entry.
    pub async fn applied(&self) -> Result<Vec<LedgerEntry>> {
        self.ledger.active_entries(false).await
    }

    /// Scaffolds an empty migration file and its rollback file.
    pub async fn create_migration_pair(&self, custom_text: &str) -> Result<(PathBuf, PathBuf)> {
        self.catalog.scaffold(custom_text, &self.events).await
    }

    /// Applies one file unless it is already recorded.
    ///
    /// Returns whether the file was run.
    async fn apply_file(&self, batch: &Batch, file_name: &str) -> Result<bool> {
        if self.ledger.is_applied(file_name).await? {
            debug!(file = %file_name, "Migration already applied, skipping");
            return Ok(false);
        }

        self.events.dispatch(&MigrationEvent::Running(file_name.to_string()));
        let content = self.catalog.read(file_name).await?;

        let outcome = self.run_statements(&content).await;
        if outcome.is_ok() {
            self.ledger
                .record_applied(batch, file_name, &checksum(content.as_bytes()))
                .await?;
            info!(file = %file_name, "Migration applied successfully");
        }
        self.append_report(file_name, &outcome).await;

        outcome.map(|()| true)
    }

    /// Runs the rollback file of one ledger entry.
    async fn rollback_entry(&self, batch: &Batch, entry: &LedgerEntry) -> Result<()> {
        let rollback_file = match self.catalog.resolve_rollback_file(&entry.file_name).await {
            Ok(name) => name,
            Err(MigrateError::RollbackNotFound { .. }) => {
                self.events.dispatch(&MigrationEvent::SkipRollback(entry.file_name.clone()));
                return self.ledger.soft_delete(batch, &entry.file_name).await;
            }
            Err(e) => return Err(e),
        };

        self.events.dispatch(&MigrationEvent::RunningRollback(rollback_file.clone()));
        let content = self.catalog.read(&rollback_file).await?;

        let outcome = self.run_statements(&content).await;
        if outcome.is_ok() {
            self.ledger.soft_delete(batch, &entry.file_name).await?;
            info!(file = %entry.file_name, "Migration rolled back successfully");
        }
        self.append_report(&rollback_file, &outcome).await;

        outcome
    }

    /// Splits a file and runs each statement in its own transaction.
    async fn run_statements(&self, content: &str) -> Result<()> {
        for statement in self.splitter.split(content) {
            debug!(sql = %statement, "Executing SQL");
            self.connection.execute_in_transaction(&statement).await?;
        }
        Ok(())
    }

    /// Records the outcome of an attempt. A failing report write is logged so
    /// it never hides the outcome itself.
    async fn append_report(&self, file_name: &str, outcome: &Result<()>) {
        let message = outcome.as_ref().err().map(ToString::to_string);
        if let Err(e) = self.ledger.append_report(file_name, message.as_deref()).await {
            warn!(file = %file_name, error = %e, "Failed to append migration report");
        }
    }
}
