//! Database maintenance: backup, import, and reset.
//!
//! Backup uses SQLite's online backup API so a consistent copy can be taken
//! while ingestion keeps writing. Import swaps the whole database file for a
//! candidate; the live connection is taken out of its mutex for the duration
//! so concurrent callers fail fast with `StoreUnavailable` instead of
//! touching a half-swapped file, and any failure mid-swap rolls back to a
//! safety copy taken first.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, backup::Backup};
use tracing::{error, info, warn};

use super::{Store, open_connection};
use crate::error::{Result, StarlogError};

/// Pages copied per backup step before yielding the source lock.
const BACKUP_PAGES_PER_STEP: std::ffi::c_int = 256;

/// Tables a candidate database must contain to be importable.
const REQUIRED_TABLES: &[&str] = &[
    "systems",
    "bodies",
    "bio_detections",
    "codex_entries",
    "sessions",
    "route_history",
];

/// Result of a backup or import, reported rather than thrown: callers show
/// it to the user either way.
#[derive(Debug, Clone)]
pub struct MaintenanceOutcome {
    /// Whether the operation completed.
    pub success: bool,
    /// File the operation produced or consumed.
    pub path: PathBuf,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl MaintenanceOutcome {
    fn ok(path: PathBuf) -> Self {
        Self {
            success: true,
            path,
            error: None,
        }
    }

    fn failed(path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            success: false,
            path,
            error: Some(error.into()),
        }
    }
}

impl Store {
    /// Copy the live database to `dest` using the online backup API.
    ///
    /// Ingestion may continue writing during the copy; the result is still a
    /// consistent snapshot.
    #[must_use]
    pub fn backup(&self, dest: &Path) -> MaintenanceOutcome {
        let result = self.with_conn(|conn| {
            let mut target = Connection::open(dest)?;
            let backup = Backup::new(conn, &mut target)?;
            backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::from_millis(5), None)?;
            Ok(())
        });
        match result {
            Ok(()) => {
                info!(dest = %dest.display(), "database backed up");
                MaintenanceOutcome::ok(dest.to_path_buf())
            }
            Err(err) => {
                error!(dest = %dest.display(), %err, "backup failed");
                // A failed backup may leave a partial file behind.
                let _ = fs::remove_file(dest);
                MaintenanceOutcome::failed(dest.to_path_buf(), err.to_string())
            }
        }
    }

    /// Replace the live database with `candidate`.
    ///
    /// The candidate is validated read-only first. The swap itself is guarded
    /// by a timestamped safety copy: if anything fails after the live file is
    /// touched, the previous database is restored and reopened, so the store
    /// never ends up corrupt or lost. While the swap runs, every other store
    /// call fails with `StoreUnavailable`.
    #[must_use]
    pub fn import(&self, candidate: &Path) -> MaintenanceOutcome {
        if self.db_path.as_os_str() == ":memory:" {
            return MaintenanceOutcome::failed(
                candidate.to_path_buf(),
                "in-memory database cannot be replaced",
            );
        }
        if let Err(err) = validate_candidate(candidate) {
            warn!(candidate = %candidate.display(), %err, "import candidate rejected");
            return MaintenanceOutcome::failed(candidate.to_path_buf(), err.to_string());
        }

        // Close the live connection and release the lock; concurrent callers
        // now get StoreUnavailable instead of racing the file swap.
        drop(self.conn.lock().take());

        let backup_path = self.db_path.with_extension(format!(
            "{}.bak",
            Utc::now().format("%Y%m%dT%H%M%S")
        ));

        match self.swap_database(candidate, &backup_path) {
            Ok(conn) => {
                *self.conn.lock() = Some(conn);
                let _ = fs::remove_file(&backup_path);
                info!(candidate = %candidate.display(), "database imported");
                MaintenanceOutcome::ok(candidate.to_path_buf())
            }
            Err(err) => {
                error!(candidate = %candidate.display(), %err, "import failed, rolling back");
                match self.restore_from(&backup_path) {
                    Ok(conn) => {
                        *self.conn.lock() = Some(conn);
                        let _ = fs::remove_file(&backup_path);
                    }
                    Err(restore_err) => {
                        // Leave the safety copy on disk for manual recovery.
                        error!(
                            backup = %backup_path.display(),
                            %restore_err,
                            "rollback failed, previous database kept as backup"
                        );
                    }
                }
                MaintenanceOutcome::failed(candidate.to_path_buf(), err.to_string())
            }
        }
    }

    fn swap_database(&self, candidate: &Path, backup_path: &Path) -> Result<Connection> {
        if self.db_path.exists() {
            fs::copy(&self.db_path, backup_path)?;
        }
        remove_sidecars(&self.db_path)?;
        fs::copy(candidate, &self.db_path)?;
        copy_sidecars(candidate, &self.db_path)?;
        open_connection(&self.db_path, &self.config)
    }

    fn restore_from(&self, backup_path: &Path) -> Result<Connection> {
        if backup_path.exists() {
            remove_sidecars(&self.db_path)?;
            fs::copy(backup_path, &self.db_path)?;
        }
        open_connection(&self.db_path, &self.config)
    }

    /// Delete every row and reclaim the file space. The schema survives.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn reset(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            // Child tables first; cascades would cover it but explicit order
            // keeps foreign_keys irrelevant here.
            tx.execute_batch(
                "DELETE FROM bio_detections;
                 DELETE FROM bodies;
                 DELETE FROM route_history;
                 DELETE FROM codex_entries;
                 DELETE FROM sessions;
                 DELETE FROM systems;",
            )?;
            tx.commit()?;
            conn.execute_batch("VACUUM;")?;
            info!("database reset");
            Ok(())
        })
    }
}

/// Open `candidate` read-only and check it is a sound exploration database.
fn validate_candidate(candidate: &Path) -> Result<()> {
    let conn = Connection::open_with_flags(
        candidate,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(StarlogError::Validation {
            reason: format!("integrity check failed: {verdict}"),
        });
    }

    for table in REQUIRED_TABLES {
        let present: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        if present == 0 {
            return Err(StarlogError::Validation {
                reason: format!("missing table: {table}"),
            });
        }
    }
    Ok(())
}

fn remove_sidecars(db_path: &Path) -> std::io::Result<()> {
    for sidecar in sidecar_paths(db_path) {
        if sidecar.exists() {
            fs::remove_file(sidecar)?;
        }
    }
    Ok(())
}

fn copy_sidecars(from: &Path, to: &Path) -> std::io::Result<()> {
    for (src, dst) in sidecar_paths(from).into_iter().zip(sidecar_paths(to)) {
        if src.exists() {
            fs::copy(src, dst)?;
        }
    }
    Ok(())
}

fn sidecar_paths(db_path: &Path) -> [PathBuf; 2] {
    let base = db_path.as_os_str().to_os_string();
    let mut wal = base.clone();
    wal.push("-wal");
    let mut shm = base;
    shm.push("-shm");
    [PathBuf::from(wal), PathBuf::from(shm)]
}
