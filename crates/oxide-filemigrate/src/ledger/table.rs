//! Relational ledger.
//!
//! Manages the `<prefix>_migrations` and `<prefix>_migration_reports` tables
//! in the migrated database itself.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Batch, Ledger, LedgerEntry, LedgerKind, ReportEntry, sort_for_rollback};
use crate::connection::{ColumnKind, Connection, SqlRow, SqlValue};
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Default prefix of the ledger tables.
pub const DEFAULT_TABLE_PREFIX: &str = "oxide";

const ENTRY_COLUMNS: [ColumnKind; 3] = [ColumnKind::Text, ColumnKind::Timestamp, ColumnKind::Text];

const REPORT_COLUMNS: [ColumnKind; 4] = [
    ColumnKind::Text,
    ColumnKind::Timestamp,
    ColumnKind::Text,
    ColumnKind::Text,
];

/// Ledger stored as a table pair in the migrated database.
pub struct TableLedger {
    connection: Arc<dyn Connection>,
    dialect: Dialect,
    prefix: String,
}

impl TableLedger {
    /// Creates a table ledger; an empty prefix falls back to
    /// [`DEFAULT_TABLE_PREFIX`].
    pub fn new(
        connection: Arc<dyn Connection>,
        dialect: Dialect,
        prefix: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.is_empty() {
            DEFAULT_TABLE_PREFIX.to_string()
        } else {
            prefix
        };
        Self {
            connection,
            dialect,
            prefix,
        }
    }

    /// Returns the table prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the applied-migrations table name.
    #[must_use]
    pub fn migrations_table(&self) -> String {
        self.dialect.migrations_table(&self.prefix)
    }

    /// Returns the reports table name.
    #[must_use]
    pub fn reports_table(&self) -> String {
        self.dialect.reports_table(&self.prefix)
    }

    fn p(&self, index: usize) -> String {
        self.dialect.placeholder(index)
    }

    fn decode_entry(row: SqlRow) -> Result<LedgerEntry> {
        let mut values = row.into_iter();
        let file_name = values
            .next()
            .and_then(SqlValue::into_text)
            .ok_or_else(|| MigrateError::InvalidState("ledger row without file name".into()))?;
        let applied_at = values
            .next()
            .and_then(|v| v.as_timestamp())
            .ok_or_else(|| {
                MigrateError::InvalidState(format!("ledger row '{file_name}' without created_at"))
            })?;
        let checksum = values.next().and_then(SqlValue::into_text).unwrap_or_default();

        Ok(LedgerEntry {
            file_name,
            applied_at,
            checksum: checksum.trim_end().to_string(),
        })
    }

    fn decode_report(row: SqlRow) -> Result<ReportEntry> {
        let mut values = row.into_iter();
        let file_name = values.next().and_then(SqlValue::into_text).unwrap_or_default();
        let created_at = values
            .next()
            .and_then(|v| v.as_timestamp())
            .ok_or_else(|| {
                MigrateError::InvalidState(format!("report row '{file_name}' without created_at"))
            })?;
        let result_status = values.next().and_then(SqlValue::into_text).unwrap_or_default();
        let message = values.next().and_then(SqlValue::into_text).unwrap_or_default();

        Ok(ReportEntry {
            file_name,
            created_at,
            result_status,
            message,
        })
    }
}

#[async_trait]
impl Ledger for TableLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Db
    }

    async fn ensure_schema(&self) -> Result<()> {
        for sql in self.dialect.ledger_schema(&self.prefix) {
            debug!(sql = %sql, "Ensuring ledger table");
            self.connection.execute_in_transaction(&sql).await?;
        }
        Ok(())
    }

    async fn is_applied(&self, file_name: &str) -> Result<bool> {
        let sql = format!(
            "SELECT file_name FROM {} WHERE file_name = {} AND deleted_at IS NULL",
            self.migrations_table(),
            self.p(1)
        );
        let rows = self
            .connection
            .fetch_rows(&sql, &[file_name.into()], &[ColumnKind::Text])
            .await?;
        Ok(!rows.is_empty())
    }

    async fn record_applied(&self, batch: &Batch, file_name: &str, checksum: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (file_name, created_at, checksum) VALUES ({})",
            self.migrations_table(),
            self.dialect.placeholders(3)
        );
        self.connection
            .execute_with(
                &sql,
                &[
                    file_name.into(),
                    batch.timestamp().into(),
                    checksum.into(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn soft_delete(&self, batch: &Batch, file_name: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET deleted_at = {} WHERE file_name = {} AND deleted_at IS NULL",
            self.migrations_table(),
            self.p(1),
            self.p(2)
        );
        self.connection
            .execute_with(&sql, &[batch.timestamp().into(), file_name.into()])
            .await?;
        Ok(())
    }

    async fn active_entries(&self, latest_batch_only: bool) -> Result<Vec<LedgerEntry>> {
        let table = self.migrations_table();
        let mut sql = format!(
            "SELECT file_name, created_at, checksum FROM {table} WHERE deleted_at IS NULL"
        );
        if latest_batch_only {
            sql.push_str(&format!(
                " AND created_at = (SELECT MAX(created_at) FROM {table} WHERE deleted_at IS NULL)"
            ));
        }
        sql.push_str(" ORDER BY file_name DESC");

        let rows = self.connection.fetch_rows(&sql, &[], &ENTRY_COLUMNS).await?;
        let mut entries = rows
            .into_iter()
            .map(Self::decode_entry)
            .collect::<Result<Vec<_>>>()?;

        // Collation differs per engine; the rollback order must not.
        sort_for_rollback(&mut entries);
        Ok(entries)
    }

    async fn append_report(&self, file_name: &str, error: Option<&str>) -> Result<()> {
        let entry = ReportEntry::new(file_name, error);
        let sql = format!(
            "INSERT INTO {} (file_name, created_at, result_status, message) VALUES ({})",
            self.reports_table(),
            self.dialect.placeholders(4)
        );
        self.connection
            .execute_with(
                &sql,
                &[
                    entry.file_name.into(),
                    entry.created_at.into(),
                    entry.result_status.into(),
                    entry.message.into(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn report_entries(&self) -> Result<Vec<ReportEntry>> {
        let sql = format!(
            "SELECT file_name, created_at, result_status, message FROM {}",
            self.reports_table()
        );
        let rows = self.connection.fetch_rows(&sql, &[], &REPORT_COLUMNS).await?;
        rows.into_iter().map(Self::decode_report).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn create_ledger() -> TableLedger {
        let pool = create_test_pool().await;
        let ledger = TableLedger::new(Arc::new(pool), Dialect::Sqlite, "test");
        ledger.ensure_schema().await.unwrap();
        ledger
    }

    fn batch(minute: u32) -> Batch {
        Batch::at(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, minute, 0)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let ledger = create_ledger().await;
        ledger.ensure_schema().await.unwrap();
        assert_eq!(ledger.migrations_table(), "test_migrations");
        assert_eq!(ledger.reports_table(), "test_migration_reports");
    }

    #[tokio::test]
    async fn test_empty_prefix_uses_default() {
        let ledger = TableLedger::new(Arc::new(create_test_pool().await), Dialect::Sqlite, "");
        assert_eq!(ledger.prefix(), DEFAULT_TABLE_PREFIX);
    }

    #[tokio::test]
    async fn test_record_and_check_applied() {
        let ledger = create_ledger().await;

        assert!(!ledger.is_applied("a.sql").await.unwrap());
        ledger.record_applied(&batch(0), "a.sql", "abc").await.unwrap();
        assert!(ledger.is_applied("a.sql").await.unwrap());

        let entries = ledger.active_entries(false).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].checksum, "abc");
        assert_eq!(entries[0].applied_at, batch(0).timestamp());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_row() {
        let ledger = create_ledger().await;
        ledger.record_applied(&batch(0), "a.sql", "abc").await.unwrap();
        ledger.soft_delete(&batch(1), "a.sql").await.unwrap();

        assert!(!ledger.is_applied("a.sql").await.unwrap());
        assert!(ledger.active_entries(false).await.unwrap().is_empty());

        let rows = ledger
            .connection
            .fetch_rows(
                "SELECT file_name, deleted_at FROM test_migrations",
                &[],
                &[ColumnKind::Text, ColumnKind::Timestamp],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1].as_timestamp(), Some(batch(1).timestamp()));

        // Re-applying after a rollback creates a fresh active entry.
        ledger.record_applied(&batch(2), "a.sql", "def").await.unwrap();
        assert!(ledger.is_applied("a.sql").await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_batch_only() {
        let ledger = create_ledger().await;
        ledger.record_applied(&batch(0), "a.sql", "1").await.unwrap();
        ledger.record_applied(&batch(0), "b.sql", "2").await.unwrap();
        ledger.record_applied(&batch(5), "c.sql", "3").await.unwrap();
        ledger.record_applied(&batch(5), "d.sql", "4").await.unwrap();

        let latest: Vec<_> = ledger
            .active_entries(true)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(latest, vec!["d.sql", "c.sql"]);

        let all: Vec<_> = ledger
            .active_entries(false)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(all, vec!["d.sql", "c.sql", "b.sql", "a.sql"]);

        ledger.soft_delete(&batch(6), "d.sql").await.unwrap();
        ledger.soft_delete(&batch(6), "c.sql").await.unwrap();
        let latest: Vec<_> = ledger
            .active_entries(true)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(latest, vec!["b.sql", "a.sql"]);
    }

    #[tokio::test]
    async fn test_report() {
        let ledger = create_ledger().await;
        assert_eq!(ledger.render_report().await.unwrap(), "");

        ledger.append_report("a.sql", None).await.unwrap();
        ledger
            .append_report("b.sql", Some("syntax error"))
            .await
            .unwrap();

        let report = ledger.render_report().await.unwrap();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Created at: "));
        assert!(lines[0].ends_with("File Name: a.sql, Status: success, Message: ok"));
        assert!(lines[1].ends_with("File Name: b.sql, Status: error, Message: syntax error"));
    }
}
