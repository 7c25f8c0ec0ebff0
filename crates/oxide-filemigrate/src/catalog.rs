//! Migration files on disk.
//!
//! Migration files are named `<timestamp>[-<text>].sql` where the timestamp
//! prefix is fixed width (`2024-01-31_09_15_00`), so a plain lexicographic sort
//! is also a chronological one. Each migration may have a paired rollback file
//! located purely by naming convention.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::events::{EventDispatcher, MigrationEvent};

/// Reserved name of the schema baseline document.
pub const BASELINE_FILE_NAME: &str = "baseline.sql";

/// Extension of migration and rollback files.
pub const SQL_EXTENSION: &str = ".sql";

/// Timestamp format used for the prefix of scaffolded files.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

const ROLLBACK_SUFFIX: &str = "-rollback";
const MIGRATE_MARKER: &str = "migrate";
const ROLLBACK_MARKER: &str = "rollback";

/// How rollback files are paired with migration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingConvention {
    /// `2024-01-01_10_00_00-users.sql` is undone by
    /// `2024-01-01_10_00_00-users-rollback.sql`.
    #[default]
    Suffix,
    /// `2024-01-01_10_00_00-migrate-users.sql` is undone by
    /// `2024-01-01_10_00_00-rollback-users.sql`. Only files carrying the
    /// `migrate` marker are migrations.
    Marker,
}

impl NamingConvention {
    /// Returns whether `name` is a rollback file under this convention.
    #[must_use]
    pub fn is_rollback(self, name: &str) -> bool {
        match self {
            Self::Suffix => name
                .strip_suffix(SQL_EXTENSION)
                .is_some_and(|stem| stem.ends_with(ROLLBACK_SUFFIX)),
            Self::Marker => !name.contains(MIGRATE_MARKER) && name.contains(ROLLBACK_MARKER),
        }
    }

    /// Returns whether `name` is a forward migration under this convention.
    #[must_use]
    pub fn is_migration(self, name: &str) -> bool {
        if name == BASELINE_FILE_NAME || !name.ends_with(SQL_EXTENSION) {
            return false;
        }
        match self {
            Self::Suffix => !self.is_rollback(name),
            Self::Marker => name.contains(MIGRATE_MARKER),
        }
    }

    /// Derives the rollback file name for a migration file name.
    #[must_use]
    pub fn rollback_name(self, migration: &str) -> Option<String> {
        match self {
            Self::Suffix => migration
                .strip_suffix(SQL_EXTENSION)
                .map(|stem| format!("{stem}{ROLLBACK_SUFFIX}{SQL_EXTENSION}")),
            Self::Marker => migration
                .contains(MIGRATE_MARKER)
                .then(|| migration.replacen(MIGRATE_MARKER, ROLLBACK_MARKER, 1)),
        }
    }

    /// Builds the migration and rollback names for a scaffolded pair.
    #[must_use]
    pub fn scaffold_names(self, timestamp: &str, custom_text: &str) -> (String, String) {
        let text = if custom_text.is_empty() {
            String::new()
        } else {
            format!("-{custom_text}")
        };
        match self {
            Self::Suffix => (
                format!("{timestamp}{text}{SQL_EXTENSION}"),
                format!("{timestamp}{text}{ROLLBACK_SUFFIX}{SQL_EXTENSION}"),
            ),
            Self::Marker => (
                format!("{timestamp}-{MIGRATE_MARKER}{text}{SQL_EXTENSION}"),
                format!("{timestamp}-{ROLLBACK_MARKER}{text}{SQL_EXTENSION}"),
            ),
        }
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Suffix => "suffix",
            Self::Marker => "marker",
        })
    }
}

impl FromStr for NamingConvention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suffix" => Ok(Self::Suffix),
            "marker" => Ok(Self::Marker),
            other => Err(format!(
                "unknown naming convention '{other}' (expected suffix or marker)"
            )),
        }
    }
}

/// A migration file known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MigrationFile {
    /// File name relative to the migrations directory.
    pub name: String,
}

/// Lists, reads and scaffolds migration files in one directory.
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    dir: PathBuf,
    naming: NamingConvention,
}

impl MigrationCatalog {
    /// Creates a catalog over `dir` with the default naming convention.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            naming: NamingConvention::default(),
        }
    }

    /// Sets the naming convention.
    #[must_use]
    pub fn naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the full path of a file in the catalog.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Returns whether a file exists in the catalog directory.
    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::metadata(self.path(name))
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    /// Lists forward migrations in application order.
    ///
    /// Rollback files, the baseline document and non-SQL files are skipped.
    pub async fn ordered_files(&self) -> Result<Vec<MigrationFile>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MigrateError::MigrationsDirNotFound(self.dir.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.naming.is_migration(&name) {
                files.push(MigrationFile { name });
            }
        }

        files.sort();
        Ok(files)
    }

    /// Resolves the rollback file paired with `migration`.
    ///
    /// Fails with [`MigrateError::RollbackNotFound`] when the convention yields
    /// no name or the file is absent.
    pub async fn resolve_rollback_file(&self, migration: &str) -> Result<String> {
        let not_found = |rollback: String| MigrateError::RollbackNotFound {
            migration: migration.to_string(),
            rollback,
        };

        let rollback = self
            .naming
            .rollback_name(migration)
            .ok_or_else(|| not_found(String::new()))?;

        if self.exists(&rollback).await {
            Ok(rollback)
        } else {
            Err(not_found(rollback))
        }
    }

    /// Reads a file's content.
    pub async fn read(&self, name: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.path(name)).await?)
    }

    /// Creates an empty migration file and its rollback counterpart.
    ///
    /// Returns the paths of the migration and rollback files.
    pub async fn create_migration_pair(
        &self,
        custom_text: &str,
        now: NaiveDateTime,
    ) -> Result<(PathBuf, PathBuf)> {
        if !self.dir.is_dir() {
            return Err(MigrateError::MigrationsDirNotFound(self.dir.clone()));
        }

        let timestamp = now.format(FILE_TIMESTAMP_FORMAT).to_string();
        let (migration, rollback) = self.naming.scaffold_names(&timestamp, custom_text.trim());
        let migration_path = self.path(&migration);
        let rollback_path = self.path(&rollback);

        for path in [&migration_path, &rollback_path] {
            if tokio::fs::try_exists(path).await? {
                return Err(MigrateError::MigrationExists(path.clone()));
            }
        }

        tokio::fs::write(&migration_path, "").await?;
        tokio::fs::write(&rollback_path, "").await?;

        Ok((migration_path, rollback_path))
    }

    /// Creates a migration pair stamped with the current local time and
    /// announces both files through `events`.
    pub async fn scaffold(
        &self,
        custom_text: &str,
        events: &EventDispatcher,
    ) -> Result<(PathBuf, PathBuf)> {
        let now = chrono::Local::now().naive_local();
        let (migration, rollback) = self.create_migration_pair(custom_text, now).await?;
        events.dispatch(&MigrationEvent::FileCreated(migration.clone()));
        events.dispatch(&MigrationEvent::FileCreated(rollback.clone()));
        Ok((migration, rollback))
    }
}
