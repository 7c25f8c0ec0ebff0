#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use oxide_filemigrate::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

pub async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

pub fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content)
        .unwrap_or_else(|e| panic!("Failed to write {name}: {e}"));
}

/// Name of the `i`-th table migration written by [`write_table_migrations`].
pub fn migration_name(i: usize) -> String {
    format!("2024-03-0{i}_09_00_00-create-t{i}.sql")
}

/// Writes `n` migrations creating tables `t1..tn`, each with a rollback file.
pub fn write_table_migrations(dir: &Path, n: usize) {
    for i in 1..=n {
        let name = migration_name(i);
        let stem = name.trim_end_matches(".sql");
        write(dir, &name, &format!("CREATE TABLE t{i} (id INTEGER PRIMARY KEY);\n"));
        write(dir, &format!("{stem}-rollback.sql"), &format!("DROP TABLE t{i};\n"));
    }
}

/// A migrator over an in-memory database and a temporary migrations directory.
pub struct Fixture {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub migrator: Migrator,
}

pub async fn fixture(ledger: LedgerKind) -> Fixture {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = create_test_pool().await;
    let config = MigratorConfig::new(Dialect::Sqlite)
        .ledger(ledger)
        .table_prefix("it")
        .migrations_dir(dir.path())
        .document_dir(dir.path().join("state"));
    let migrator = Migrator::from_config(Arc::new(pool.clone()), &config)
        .expect("Failed to build migrator");
    migrator.init().await.expect("Failed to init ledger");
    Fixture {
        dir,
        pool,
        migrator,
    }
}

pub async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .expect("Failed to query sqlite_master");
    row.is_some()
}

pub async fn applied_names(migrator: &Migrator) -> Vec<String> {
    migrator
        .applied()
        .await
        .expect("Failed to list applied migrations")
        .into_iter()
        .map(|entry| entry.file_name)
        .collect()
}
