//! Progress events emitted while migrating.
//!
//! Every event is logged through `tracing` and handed to the listeners
//! registered on the [`Migrator`](crate::migrator::Migrator), so front ends can
//! print progress without the engine writing to stdout.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

/// Something the migrator did that a caller may want to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEvent {
    /// A migration file is about to run.
    Running(String),
    /// A migrate run finished; carries the number of newly applied files.
    Migrated(usize),
    /// There are no active ledger entries to roll back.
    NothingToRollback,
    /// A ledger entry has no rollback file and was skipped.
    SkipRollback(String),
    /// A rollback file is about to run.
    RunningRollback(String),
    /// A rollback run finished; carries the number of visited entries.
    RolledBack(usize),
    /// A scaffolded migration file was written.
    FileCreated(PathBuf),
}

impl fmt::Display for MigrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running(file) => write!(f, "Running migration '{file}'"),
            Self::Migrated(count) => write!(f, "Migrated {count} items"),
            Self::NothingToRollback => f.write_str("Nothing to rollback"),
            Self::SkipRollback(file) => {
                write!(f, "Skip rollback for {file} as rollback file does not exist")
            }
            Self::RunningRollback(file) => write!(f, "Running rollback '{file}'"),
            Self::RolledBack(count) => write!(f, "Rolled back {count} items"),
            Self::FileCreated(path) => write!(f, "Migration file {} created", path.display()),
        }
    }
}

/// Callback invoked for every event.
pub type EventListener = Box<dyn Fn(&MigrationEvent) + Send + Sync>;

/// Fan-out of events to registered listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<EventListener>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn register(&mut self, listener: EventListener) {
        self.listeners.push(listener);
    }

    /// Logs the event and forwards it to every listener.
    pub fn dispatch(&self, event: &MigrationEvent) {
        info!(event = ?event, "{event}");
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
