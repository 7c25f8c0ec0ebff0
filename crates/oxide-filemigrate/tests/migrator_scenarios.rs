//! End-to-end runs of the migrator against SQLite, for both ledger kinds.

mod common;

use chrono::NaiveDate;
use common::{
    applied_names, fixture, migration_name, table_exists, write, write_table_migrations,
};
use oxide_filemigrate::prelude::*;

fn batch(hour: u32) -> Batch {
    Batch::at(
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap(),
    )
}

async fn migrate_then_roll_back_in_steps(ledger: LedgerKind) {
    let fx = fixture(ledger).await;
    write_table_migrations(fx.dir.path(), 5);

    assert_eq!(fx.migrator.migrate(0).await.unwrap(), 5);
    for i in 1..=5 {
        assert!(table_exists(&fx.pool, &format!("t{i}")).await);
    }

    assert_eq!(
        fx.migrator
            .rollback(2, RollbackScope::LatestBatch)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        applied_names(&fx.migrator).await,
        vec![migration_name(3), migration_name(2), migration_name(1)]
    );
    assert!(!table_exists(&fx.pool, "t5").await);
    assert!(!table_exists(&fx.pool, "t4").await);

    assert_eq!(
        fx.migrator
            .rollback(0, RollbackScope::LatestBatch)
            .await
            .unwrap(),
        3
    );
    assert!(applied_names(&fx.migrator).await.is_empty());
    assert!(!table_exists(&fx.pool, "t1").await);

    // Five applies and five rollbacks, all successful.
    let report = fx.migrator.report().await.unwrap();
    assert_eq!(report.lines().count(), 10);
    assert!(report.lines().all(|line| line.contains("Status: success, Message: ok")));
}

#[tokio::test]
async fn test_migrate_then_roll_back_in_steps_table_ledger() {
    migrate_then_roll_back_in_steps(LedgerKind::Db).await;
}

#[tokio::test]
async fn test_migrate_then_roll_back_in_steps_document_ledger() {
    migrate_then_roll_back_in_steps(LedgerKind::Json).await;
}

async fn chunked_migrate(ledger: LedgerKind) {
    let fx = fixture(ledger).await;
    write_table_migrations(fx.dir.path(), 5);

    assert_eq!(fx.migrator.migrate(2).await.unwrap(), 2);
    assert_eq!(fx.migrator.migrate(2).await.unwrap(), 2);
    assert_eq!(fx.migrator.migrate(2).await.unwrap(), 1);
    assert_eq!(fx.migrator.migrate(0).await.unwrap(), 0);
    assert_eq!(applied_names(&fx.migrator).await.len(), 5);
}

#[tokio::test]
async fn test_chunked_migrate_table_ledger() {
    chunked_migrate(LedgerKind::Db).await;
}

#[tokio::test]
async fn test_chunked_migrate_document_ledger() {
    chunked_migrate(LedgerKind::Json).await;
}

async fn rollback_touches_latest_batch_only(ledger: LedgerKind) {
    let fx = fixture(ledger).await;
    write_table_migrations(fx.dir.path(), 5);

    fx.migrator.migrate_in_batch(3, batch(8)).await.unwrap();
    fx.migrator.migrate_in_batch(0, batch(9)).await.unwrap();

    // Asking for more than the batch holds stops at the batch boundary.
    assert_eq!(
        fx.migrator
            .rollback(10, RollbackScope::LatestBatch)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        applied_names(&fx.migrator).await,
        vec![migration_name(3), migration_name(2), migration_name(1)]
    );
    assert!(table_exists(&fx.pool, "t3").await);
    assert!(!table_exists(&fx.pool, "t4").await);

    // The older batch is next in line.
    assert_eq!(
        fx.migrator
            .rollback(1, RollbackScope::LatestBatch)
            .await
            .unwrap(),
        1
    );
    assert!(!table_exists(&fx.pool, "t3").await);
    assert!(table_exists(&fx.pool, "t2").await);
}

#[tokio::test]
async fn test_rollback_touches_latest_batch_only_table_ledger() {
    rollback_touches_latest_batch_only(LedgerKind::Db).await;
}

#[tokio::test]
async fn test_rollback_touches_latest_batch_only_document_ledger() {
    rollback_touches_latest_batch_only(LedgerKind::Json).await;
}

#[tokio::test]
async fn test_complete_rollback_spans_batches() {
    let fx = fixture(LedgerKind::Db).await;
    write_table_migrations(fx.dir.path(), 4);

    fx.migrator.migrate_in_batch(2, batch(8)).await.unwrap();
    fx.migrator.migrate_in_batch(0, batch(9)).await.unwrap();

    assert_eq!(
        fx.migrator.rollback(0, RollbackScope::All).await.unwrap(),
        4
    );
    assert!(applied_names(&fx.migrator).await.is_empty());
}

#[tokio::test]
async fn test_refresh_reapplies_everything() {
    let fx = fixture(LedgerKind::Db).await;
    write_table_migrations(fx.dir.path(), 3);

    fx.migrator.migrate_in_batch(1, batch(8)).await.unwrap();
    fx.migrator.migrate_in_batch(0, batch(9)).await.unwrap();

    let summary = fx.migrator.refresh().await.unwrap();
    assert_eq!(summary.rolled_back, 3);
    assert_eq!(summary.migrated, 3);

    // One batch now covers every file.
    let entries = fx.migrator.applied().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.applied_at == entries[0].applied_at));
    for i in 1..=3 {
        assert!(table_exists(&fx.pool, &format!("t{i}")).await);
    }
}

async fn checksum_detects_edits(ledger: LedgerKind) {
    let fx = fixture(ledger).await;
    write_table_migrations(fx.dir.path(), 3);

    fx.migrator.migrate(1).await.unwrap();
    assert!(fx.migrator.checksum_validation().await.is_empty());

    write(
        fx.dir.path(),
        &migration_name(1),
        "CREATE TABLE t1 (id INTEGER PRIMARY KEY, extra TEXT);\n",
    );
    // Pending files are never validated.
    write(fx.dir.path(), &migration_name(2), "-- rewritten\n");

    let findings = fx.migrator.checksum_validation().await;
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert!(findings[0].contains(&migration_name(1)));
    assert!(findings[0].contains("checksum mismatch"));
}

#[tokio::test]
async fn test_checksum_detects_edits_table_ledger() {
    checksum_detects_edits(LedgerKind::Db).await;
}

#[tokio::test]
async fn test_checksum_detects_edits_document_ledger() {
    checksum_detects_edits(LedgerKind::Json).await;
}

#[tokio::test]
async fn test_failed_migration_can_be_fixed_and_retried() {
    let fx = fixture(LedgerKind::Db).await;
    let name = "2024-03-01_09_00_00-seed.sql";
    write(
        fx.dir.path(),
        name,
        "CREATE TABLE IF NOT EXISTS seed (id INTEGER);\nINSERT INTO missing VALUES (1);\n",
    );

    assert!(fx.migrator.migrate(0).await.is_err());
    assert!(applied_names(&fx.migrator).await.is_empty());

    write(
        fx.dir.path(),
        name,
        "CREATE TABLE IF NOT EXISTS seed (id INTEGER);\nINSERT INTO seed VALUES (1);\n",
    );
    assert_eq!(fx.migrator.migrate(0).await.unwrap(), 1);

    let report = fx.migrator.report().await.unwrap();
    let statuses: Vec<_> = report
        .lines()
        .map(|line| line.contains("Status: success"))
        .collect();
    assert_eq!(statuses, vec![false, true]);
}

#[tokio::test]
async fn test_missing_migrations_dir() {
    let fx = fixture(LedgerKind::Db).await;
    let config = MigratorConfig::new(Dialect::Sqlite)
        .migrations_dir(fx.dir.path().join("does-not-exist"));
    let migrator =
        Migrator::from_config(std::sync::Arc::new(fx.pool.clone()), &config).unwrap();

    assert!(matches!(
        migrator.migrate(0).await,
        Err(MigrateError::MigrationsDirNotFound(_))
    ));
}

#[tokio::test]
async fn test_marker_naming_convention() {
    let fx = fixture(LedgerKind::Db).await;
    let config = MigratorConfig::new(Dialect::Sqlite)
        .table_prefix("marker")
        .migrations_dir(fx.dir.path())
        .naming(NamingConvention::Marker);
    let migrator =
        Migrator::from_config(std::sync::Arc::new(fx.pool.clone()), &config).unwrap();
    migrator.init().await.unwrap();

    write(
        fx.dir.path(),
        "2024-03-01_09_00_00-migrate-users.sql",
        "CREATE TABLE users (id INTEGER);",
    );
    write(
        fx.dir.path(),
        "2024-03-01_09_00_00-rollback-users.sql",
        "DROP TABLE users;",
    );
    write(fx.dir.path(), "baseline.sql", "CREATE TABLE ignored (id INTEGER);");

    assert_eq!(migrator.migrate(0).await.unwrap(), 1);
    assert!(table_exists(&fx.pool, "users").await);
    assert!(!table_exists(&fx.pool, "ignored").await);

    assert_eq!(
        migrator.rollback(0, RollbackScope::LatestBatch).await.unwrap(),
        1
    );
    assert!(!table_exists(&fx.pool, "users").await);
}
