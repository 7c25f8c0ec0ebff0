//! Document ledger.
//!
//! Keeps the ledger as two JSON documents in a directory:
//! `migrations.json` maps each file name to `{appliedAt, checksum}` (plus
//! `deletedAt` once rolled back) and `migration_reports.json` is an array of
//! report entries. Documents are rewritten through a temporary file so a
//! crash never leaves half a document behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Batch, Ledger, LedgerEntry, LedgerKind, ReportEntry, ledger_time, retain_latest_batch,
    sort_for_rollback,
};
use crate::error::Result;

/// File name of the applied-migrations document.
pub const MIGRATIONS_DOCUMENT: &str = "migrations.json";

/// File name of the report document.
pub const REPORTS_DOCUMENT: &str = "migration_reports.json";

/// One file's record in `migrations.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentEntry {
    #[serde(with = "ledger_time")]
    applied_at: NaiveDateTime,
    #[serde(default)]
    checksum: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ledger_time::option"
    )]
    deleted_at: Option<NaiveDateTime>,
}

type Entries = BTreeMap<String, DocumentEntry>;

/// Ledger stored as JSON documents on disk.
#[derive(Debug, Clone)]
pub struct DocumentLedger {
    dir: PathBuf,
}

impl DocumentLedger {
    /// Creates a document ledger rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the path of the applied-migrations document.
    #[must_use]
    pub fn migrations_path(&self) -> PathBuf {
        self.dir.join(MIGRATIONS_DOCUMENT)
    }

    /// Returns the path of the report document.
    #[must_use]
    pub fn reports_path(&self) -> PathBuf {
        self.dir.join(REPORTS_DOCUMENT)
    }

    async fn load_entries(&self) -> Result<Entries> {
        load_document(&self.migrations_path()).await
    }

    async fn save_entries(&self, entries: &Entries) -> Result<()> {
        save_document(&self.migrations_path(), entries).await
    }
}

/// Reads a JSON document, treating a missing or empty file as the default.
async fn load_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn save_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "Saved ledger document");
    Ok(())
}

#[async_trait]
impl Ledger for DocumentLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Json
    }

    async fn ensure_schema(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn is_applied(&self, file_name: &str) -> Result<bool> {
        let entries = self.load_entries().await?;
        Ok(entries
            .get(file_name)
            .is_some_and(|entry| entry.deleted_at.is_none()))
    }

    async fn record_applied(&self, batch: &Batch, file_name: &str, checksum: &str) -> Result<()> {
        let mut entries = self.load_entries().await?;
        entries.insert(
            file_name.to_string(),
            DocumentEntry {
                applied_at: batch.timestamp(),
                checksum: checksum.to_string(),
                deleted_at: None,
            },
        );
        self.save_entries(&entries).await
    }

    async fn soft_delete(&self, batch: &Batch, file_name: &str) -> Result<()> {
        let mut entries = self.load_entries().await?;
        match entries.get_mut(file_name) {
            Some(entry) if entry.deleted_at.is_none() => {
                entry.deleted_at = Some(batch.timestamp());
                self.save_entries(&entries).await
            }
            _ => Ok(()),
        }
    }

    async fn active_entries(&self, latest_batch_only: bool) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .load_entries()
            .await?
            .into_iter()
            .filter(|(_, entry)| entry.deleted_at.is_none())
            .map(|(file_name, entry)| LedgerEntry {
                file_name,
                applied_at: entry.applied_at,
                checksum: entry.checksum,
            })
            .collect();

        if latest_batch_only {
            retain_latest_batch(&mut entries);
        }
        sort_for_rollback(&mut entries);
        Ok(entries)
    }

    async fn append_report(&self, file_name: &str, error: Option<&str>) -> Result<()> {
        let path = self.reports_path();
        let mut reports: Vec<ReportEntry> = load_document(&path).await?;
        reports.push(ReportEntry::new(file_name, error));
        save_document(&path, &reports).await
    }

    async fn report_entries(&self) -> Result<Vec<ReportEntry>> {
        load_document(&self.reports_path()).await
    }
}
