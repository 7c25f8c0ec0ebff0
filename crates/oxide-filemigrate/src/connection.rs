//! The database capability the engine needs.
//!
//! The engine never opens connections. Callers hand it something implementing
//! [`Connection`]; implementations are provided for the sqlx SQLite,
//! PostgreSQL and MySQL pools. Engines without a sqlx driver (Firebird) plug
//! in by implementing the trait for their own handle.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use sqlx::mysql::MySqlPool;
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;

use crate::error::Result;

/// A value bound to, or read from, a ledger query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Character data.
    Text(String),
    /// A timestamp without time zone, at second resolution for ledger rows.
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the value and returns the text content.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is a timestamp value.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

/// How a result column should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Decode as nullable text.
    Text,
    /// Decode as a nullable timestamp.
    Timestamp,
}

/// One decoded result row.
pub type SqlRow = Vec<SqlValue>;

/// An opened database handle.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs one raw statement inside its own transaction.
    ///
    /// The transaction is committed on success and rolled back on failure.
    /// Statements are sent unprepared so routine definitions are accepted on
    /// every engine.
    async fn execute_in_transaction(&self, sql: &str) -> Result<()>;

    /// Runs a parameterised statement and returns the number of affected rows.
    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs a parameterised query and decodes each row by `columns`.
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[SqlValue],
        columns: &[ColumnKind],
    ) -> Result<Vec<SqlRow>>;
}

/// Binds ledger values onto a sqlx query.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Text(value) => query.bind(value.clone()),
                SqlValue::Timestamp(value) => query.bind(*value),
            };
        }
        query
    }};
}

/// Implements [`Connection`] for a sqlx pool type.
macro_rules! sqlx_connection {
    ($pool:ty, $db:ty) => {
        #[async_trait]
        impl Connection for $pool {
            async fn execute_in_transaction(&self, sql: &str) -> Result<()> {
                let mut tx = self.begin().await?;
                sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(sql)).await?;
                tx.commit().await?;
                Ok(())
            }

            async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
                let query = bind_params!(sqlx::query::<$db>(sql), params);
                Ok(query.execute(self).await?.rows_affected())
            }

            async fn fetch_rows(
                &self,
                sql: &str,
                params: &[SqlValue],
                columns: &[ColumnKind],
            ) -> Result<Vec<SqlRow>> {
                let query = bind_params!(sqlx::query::<$db>(sql), params);
                let rows = query.fetch_all(self).await?;

                let mut decoded = Vec::with_capacity(rows.len());
                for row in &rows {
                    let mut values = Vec::with_capacity(columns.len());
                    for (index, kind) in columns.iter().enumerate() {
                        let value = match kind {
                            ColumnKind::Text => row
                                .try_get::<Option<String>, _>(index)?
                                .map_or(SqlValue::Null, SqlValue::Text),
                            ColumnKind::Timestamp => row
                                .try_get::<Option<NaiveDateTime>, _>(index)?
                                .map_or(SqlValue::Null, SqlValue::Timestamp),
                        };
                        values.push(value);
                    }
                    decoded.push(values);
                }
                Ok(decoded)
            }
        }
    };
}

sqlx_connection!(SqlitePool, sqlx::Sqlite);
sqlx_connection!(PgPool, sqlx::Postgres);
sqlx_connection!(MySqlPool, sqlx::MySql);
