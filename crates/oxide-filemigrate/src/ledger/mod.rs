//! Applied-migration ledger.
//!
//! The ledger records which migration files are currently applied, the
//! checksum of each file at apply time, and an append-only report of every
//! apply or rollback attempt. Two storage kinds implement the same
//! [`Ledger`] trait: a relational table pair ([`TableLedger`]) and JSON
//! documents on disk ([`DocumentLedger`]).

mod document;
mod table;

pub use document::{DocumentLedger, MIGRATIONS_DOCUMENT, REPORTS_DOCUMENT};
pub use table::{DEFAULT_TABLE_PREFIX, TableLedger};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Timestamp format used in reports and ledger documents.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Report status of a successful attempt.
pub const STATUS_SUCCESS: &str = "success";

/// Report status of a failed attempt.
pub const STATUS_ERROR: &str = "error";

/// Report message of a successful attempt.
pub const MESSAGE_OK: &str = "ok";

/// Returns the current UTC time truncated to whole seconds.
#[must_use]
pub fn now_seconds() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

/// The timestamp shared by every file applied in one invocation.
///
/// Ledger entries with the same batch timestamp are rolled back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Batch {
    timestamp: NaiveDateTime,
}

impl Batch {
    /// Starts a batch at the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(now_seconds())
    }

    /// Starts a batch at the given time, truncated to whole seconds.
    #[must_use]
    pub fn at(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    /// Returns the batch timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// One applied migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Migration file name.
    pub file_name: String,
    /// Batch timestamp of the run that applied the file.
    pub applied_at: NaiveDateTime,
    /// Checksum of the file content at apply time.
    pub checksum: String,
}

/// One line of the audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    /// The migration or rollback file that was run.
    pub file_name: String,
    /// When the attempt finished.
    #[serde(with = "ledger_time")]
    pub created_at: NaiveDateTime,
    /// `success` or `error`.
    pub result_status: String,
    /// `ok` or the error message.
    pub message: String,
}

impl ReportEntry {
    /// Builds a report entry for an attempt that finished now.
    #[must_use]
    pub fn new(file_name: &str, error: Option<&str>) -> Self {
        let (result_status, message) = match error {
            Some(message) => (STATUS_ERROR, message),
            None => (STATUS_SUCCESS, MESSAGE_OK),
        };
        Self {
            file_name: file_name.to_string(),
            created_at: now_seconds(),
            result_status: result_status.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Created at: {}, File Name: {}, Status: {}, Message: {}",
            self.created_at.format(TIME_FORMAT),
            self.file_name,
            self.result_status,
            self.message
        )
    }
}

/// Renders report entries one per line, in the order given.
#[must_use]
pub fn render_report<'a>(entries: impl IntoIterator<Item = &'a ReportEntry>) -> String {
    entries
        .into_iter()
        .map(|entry| format!("{entry}\n"))
        .collect()
}

/// Sorts entries descending by file name, the order rollbacks run in.
pub(crate) fn sort_for_rollback(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| b.file_name.cmp(&a.file_name));
}

/// Keeps only the entries of the most recent batch.
pub(crate) fn retain_latest_batch(entries: &mut Vec<LedgerEntry>) {
    if let Some(latest) = entries.iter().map(|e| e.applied_at).max() {
        entries.retain(|e| e.applied_at == latest);
    }
}

/// Storage for applied migrations and their audit report.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Returns the storage kind.
    fn kind(&self) -> LedgerKind;

    /// Creates the ledger's storage if it does not exist yet.
    async fn ensure_schema(&self) -> Result<()>;

    /// Returns whether `file_name` has an active entry.
    async fn is_applied(&self, file_name: &str) -> Result<bool>;

    /// Records `file_name` as applied in `batch`.
    async fn record_applied(&self, batch: &Batch, file_name: &str, checksum: &str) -> Result<()>;

    /// Marks the active entry for `file_name` as rolled back at the batch time.
    async fn soft_delete(&self, batch: &Batch, file_name: &str) -> Result<()>;

    /// Returns active entries, descending by file name.
    ///
    /// With `latest_batch_only`, only entries of the most recent batch are
    /// returned.
    async fn active_entries(&self, latest_batch_only: bool) -> Result<Vec<LedgerEntry>>;

    /// Appends a report entry; `error` carries the failure message, if any.
    async fn append_report(&self, file_name: &str, error: Option<&str>) -> Result<()>;

    /// Returns all report entries in storage order.
    async fn report_entries(&self) -> Result<Vec<ReportEntry>>;

    /// Renders the report, one line per entry.
    async fn render_report(&self) -> Result<String> {
        let entries = self.report_entries().await?;
        Ok(render_report(&entries))
    }
}

/// Ledger storage kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Table pair in the migrated database.
    #[default]
    #[serde(alias = "table")]
    Db,
    /// JSON documents on disk.
    #[serde(alias = "document")]
    Json,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Db => "db",
            Self::Json => "json",
        })
    }
}

impl FromStr for LedgerKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" | "table" | "database" => Ok(Self::Db),
            "json" | "document" => Ok(Self::Json),
            _ => Err(MigrateError::UnknownLedgerKind(s.to_string())),
        }
    }
}

/// Everything needed to open either ledger kind.
#[derive(Clone)]
pub struct LedgerOptions {
    /// Storage kind.
    pub kind: LedgerKind,
    /// Connection for the table ledger.
    pub connection: Arc<dyn Connection>,
    /// Dialect of the connection.
    pub dialect: Dialect,
    /// Table name prefix.
    pub table_prefix: String,
    /// Directory holding the ledger documents.
    pub document_dir: PathBuf,
}

/// Opens the ledger selected by `options.kind`.
#[must_use]
pub fn open(options: LedgerOptions) -> Box<dyn Ledger> {
    match options.kind {
        LedgerKind::Db => Box::new(TableLedger::new(
            options.connection,
            options.dialect,
            options.table_prefix,
        )),
        LedgerKind::Json => Box::new(DocumentLedger::new(options.document_dir)),
    }
}

/// Serde adapter for `%Y-%m-%d %H:%M:%S` timestamps.
pub(crate) mod ledger_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }

    /// Same format for optional timestamps.
    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        use super::super::TIME_FORMAT;

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.collect_str(&value.format(TIME_FORMAT)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| NaiveDateTime::parse_from_str(&raw, TIME_FORMAT))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}
