//! Planner ↔ redb persistence.
//!
//! The save file holds one JSON snapshot under one key: loaded on boot,
//! overwritten wholesale after every mutation. Never queried at runtime
//! — the in-memory Planner is the truth. An unreadable snapshot is a
//! warning and an empty planner, never a boot failure.

use crate::planner::{Goal, Planner, Reminder, Task};
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const SNAPSHOT: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshot");
const SNAPSHOT_KEY: &str = "planner";

/// The on-disk shape: three flat arrays, nothing derived.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    tasks: Vec<Task>,
    goals: Vec<Goal>,
    reminders: Vec<Reminder>,
}

impl From<&Planner> for Snapshot {
    fn from(planner: &Planner) -> Self {
        Snapshot {
            tasks: planner.tasks.values().cloned().collect(),
            goals: planner.goals.values().cloned().collect(),
            reminders: planner.reminders.values().cloned().collect(),
        }
    }
}

impl From<Snapshot> for Planner {
    fn from(snapshot: Snapshot) -> Self {
        let mut planner = Planner::new();
        for task in snapshot.tasks {
            planner.tasks.insert(task.id, task);
        }
        for goal in snapshot.goals {
            planner.goals.insert(goal.id, goal);
        }
        for reminder in snapshot.reminders {
            planner.reminders.insert(reminder.id, reminder);
        }
        planner
    }
}

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct SaveFile {
    db: Arc<Database>,
}

impl SaveFile {
    /// Open (or create) the save file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SaveFileError> {
        let db = Database::create(path)?;

        // Ensure the table exists so load never sees a missing table.
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(SNAPSHOT)?;
        }
        txn.commit()?;

        Ok(SaveFile { db: Arc::new(db) })
    }

    /// Load the planner from disk. Called once at boot.
    ///
    /// A missing snapshot (first run) and one that fails to decode both
    /// come back as an empty planner; the latter logs a warning. redb
    /// commits are atomic, so a crash mid-flush leaves the previous
    /// snapshot rather than torn bytes — the decode fallback covers
    /// anything else.
    pub fn load_planner(&self) -> Result<Planner, SaveFileError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SNAPSHOT)?;

        let Some(raw) = table.get(SNAPSHOT_KEY)? else {
            return Ok(Planner::new());
        };

        match serde_json::from_slice::<Snapshot>(raw.value()) {
            Ok(snapshot) => Ok(snapshot.into()),
            Err(e) => {
                warn!("snapshot unreadable, starting empty: {e}");
                Ok(Planner::new())
            }
        }
    }

    /// Overwrite the snapshot with the planner's current state.
    /// Called after every successful apply(). Wholesale — there are no
    /// partial writes to tear halfway.
    pub fn flush(&self, planner: &Planner) -> Result<(), SaveFileError> {
        let bytes = serde_json::to_vec(&Snapshot::from(planner))
            .map_err(|e| SaveFileError::Encode(e.to_string()))?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SNAPSHOT)?;
            table.insert(SNAPSHOT_KEY, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SaveFileError {
    Redb(String),
    Encode(String),
}

// redb 2.x has many error types. Blanket them all into SaveFileError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for SaveFileError {
            fn from(e: $t) -> Self { SaveFileError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

impl std::fmt::Display for SaveFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveFileError::Redb(e) => write!(f, "redb: {e}"),
            SaveFileError::Encode(e) => write!(f, "encode: {e}"),
        }
    }
}

impl std::error::Error for SaveFileError {}

// ── Tests ──────────────────────────────────────────────────────
