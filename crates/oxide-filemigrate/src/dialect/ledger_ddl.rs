//! Ledger table DDL per engine family.

/// Applied-migrations table for engines with a `DATETIME` type (SQLite, MySQL).
pub(super) fn datetime_migrations(table: &str) -> String {
    format!(
        r"CREATE TABLE IF NOT EXISTS {table} (
    file_name VARCHAR(255) NOT NULL,
    created_at DATETIME NOT NULL,
    deleted_at DATETIME NULL,
    checksum CHAR(32)
)"
    )
}

/// Reports table for engines with a `DATETIME` type (SQLite, MySQL).
pub(super) fn datetime_reports(table: &str) -> String {
    format!(
        r"CREATE TABLE IF NOT EXISTS {table} (
    file_name VARCHAR(255) NOT NULL,
    result_status VARCHAR(12) NOT NULL,
    created_at DATETIME NOT NULL,
    message TEXT
)"
    )
}

/// Applied-migrations table for PostgreSQL.
pub(super) fn timestamp_migrations(table: &str) -> String {
    format!(
        r"CREATE TABLE IF NOT EXISTS {table} (
    file_name VARCHAR(255) NOT NULL,
    created_at TIMESTAMP NOT NULL,
    deleted_at TIMESTAMP NULL,
    checksum CHAR(32)
)"
    )
}

/// Reports table for PostgreSQL.
pub(super) fn timestamp_reports(table: &str) -> String {
    format!(
        r"CREATE TABLE IF NOT EXISTS {table} (
    file_name VARCHAR(255) NOT NULL,
    result_status VARCHAR(12) NOT NULL,
    created_at TIMESTAMP NOT NULL,
    message TEXT
)"
    )
}

/// Firebird has no `IF NOT EXISTS`, so creation is guarded by a lookup in
/// `rdb$relations` inside an `EXECUTE BLOCK`.
pub(super) fn firebird_migrations(table: &str) -> String {
    firebird_guarded(
        table,
        &format!(
            "CREATE TABLE {table} (file_name VARCHAR(255) NOT NULL, created_at TIMESTAMP NOT NULL, deleted_at TIMESTAMP, checksum CHAR(32))"
        ),
    )
}

/// Reports table for Firebird.
pub(super) fn firebird_reports(table: &str) -> String {
    firebird_guarded(
        table,
        &format!(
            "CREATE TABLE {table} (file_name VARCHAR(255) NOT NULL, result_status VARCHAR(12) NOT NULL, created_at TIMESTAMP NOT NULL, message BLOB SUB_TYPE TEXT)"
        ),
    )
}

fn firebird_guarded(table: &str, create: &str) -> String {
    format!(
        r"EXECUTE BLOCK AS
BEGIN
    IF (NOT EXISTS(SELECT 1 FROM rdb$relations WHERE rdb$relation_name = '{table}')) THEN
        EXECUTE STATEMENT '{create}';
END"
    )
}
