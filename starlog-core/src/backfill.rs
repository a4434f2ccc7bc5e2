//! Historical journal replay.
//!
//! Backfill scans the journal directory, orders the files by name (the game
//! embeds a sortable timestamp), and replays every line through a fresh
//! [`SessionTracker`]. The event bus is suppressed for the duration so the
//! UI does not relive months of history; one unsuppressed refresh goes out
//! at the end. The [`IngestGate`] makes backfill and live tail ingestion
//! mutually exclusive.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Result, StarlogError};
use crate::events::{CompanionEvent, EventBus};
use crate::journal::{self, ParseOutcome};
use crate::state::SessionTracker;
use crate::store::Store;

/// Coordinates who may feed the state machine.
///
/// The tailer holds `switching` while it processes a file change; backfill
/// holds `backfilling` for its whole run. Either side finding the other's
/// flag raised backs off with a typed error instead of interleaving events.
#[derive(Debug, Default)]
pub struct IngestGate {
    switching: AtomicBool,
    backfilling: AtomicBool,
}

impl IngestGate {
    /// Claim the gate for backfill.
    ///
    /// # Errors
    ///
    /// [`StarlogError::BackfillBusy`] if a backfill is already running,
    /// [`StarlogError::TailBusy`] if the tailer is mid-switch.
    pub fn claim_backfill(&self) -> Result<BackfillClaim<'_>> {
        if self
            .backfilling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StarlogError::BackfillBusy);
        }
        if self.switching.load(Ordering::Acquire) {
            self.backfilling.store(false, Ordering::Release);
            return Err(StarlogError::TailBusy);
        }
        Ok(BackfillClaim { gate: self })
    }

    /// Whether a backfill currently holds the gate.
    #[must_use]
    pub fn is_backfilling(&self) -> bool {
        self.backfilling.load(Ordering::Acquire)
    }

    /// Mark the tailer as switching files. Returns `false` (and does not
    /// mark) while a backfill holds the gate.
    pub fn begin_switch(&self) -> bool {
        if self.backfilling.load(Ordering::Acquire) {
            return false;
        }
        self.switching.store(true, Ordering::Release);
        true
    }

    /// Clear the tailer's switching mark.
    pub fn end_switch(&self) {
        self.switching.store(false, Ordering::Release);
    }
}

/// RAII guard releasing the backfill side of the gate.
pub struct BackfillClaim<'a> {
    gate: &'a IngestGate,
}

impl Drop for BackfillClaim<'_> {
    fn drop(&mut self) {
        self.gate.backfilling.store(false, Ordering::Release);
    }
}

/// Shared cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// What a backfill run accomplished. Partial progress is kept either way;
/// re-running over the same files is safe because every write is idempotent.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Files fully replayed.
    pub files_processed: usize,
    /// Files found in the directory.
    pub total_files: usize,
    /// Journal lines that failed to decode.
    pub malformed_lines: usize,
    /// Whether the run stopped on a cancellation request.
    pub cancelled: bool,
    /// Set when the directory was missing or unreadable, had no journal
    /// files, or a file-level failure was skipped.
    pub error: Option<String>,
}

/// Replays a journal directory into the store.
pub struct Backfill {
    store: Arc<Store>,
    bus: EventBus,
    gate: Arc<IngestGate>,
}

impl Backfill {
    /// Create a backfill runner over `store`, publishing on `bus` and
    /// coordinating through `gate`.
    #[must_use]
    pub fn new(store: Arc<Store>, bus: EventBus, gate: Arc<IngestGate>) -> Self {
        Self { store, bus, gate }
    }

    /// Replay every journal file under `dir` in chronological order.
    ///
    /// `on_progress` is called after each file with (files done, total,
    /// file name).
    /// A file that cannot be read is logged and skipped; the run continues.
    /// Cancellation is honored between files, never mid-file, so no file is
    /// half-applied.
    ///
    /// # Errors
    ///
    /// [`StarlogError::BackfillBusy`] / [`StarlogError::TailBusy`] when the
    /// gate is held, and store errors if the database rejects writes.
    pub fn run(
        &self,
        dir: &Path,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(usize, usize, &str),
    ) -> Result<BackfillReport> {
        let _claim = self.gate.claim_backfill()?;

        // An unreadable or missing directory is a diagnostic, not a crash;
        // the caller shows the report either way.
        let files = match journal_files(dir) {
            Ok(files) => files,
            Err(err) => {
                warn!(dir = %dir.display(), %err, "journal directory unreadable");
                return Ok(BackfillReport {
                    error: Some(format!("{}: {err}", dir.display())),
                    ..BackfillReport::default()
                });
            }
        };
        let mut report = BackfillReport {
            total_files: files.len(),
            ..BackfillReport::default()
        };
        if files.is_empty() {
            report.error = Some(format!("no journal files in {}", dir.display()));
            return Ok(report);
        }

        info!(dir = %dir.display(), files = files.len(), "backfill started");
        self.bus.set_suppressed(true);

        let mut tracker = SessionTracker::new(Arc::clone(&self.store), self.bus.clone());
        tracker.reset();

        let outcome = self.replay_files(&files, cancel, &mut tracker, &mut report, &mut on_progress);

        // Last file of a live game has no Shutdown yet.
        if let Err(err) = tracker.close_open_session(Utc::now()) {
            warn!(%err, "failed to close trailing session");
        }
        self.bus.set_suppressed(false);

        // One refresh so the UI catches up with the replayed state.
        if let Some(system) = tracker.current_system() {
            self.bus.emit_unsuppressed(CompanionEvent::SystemChanged {
                system: system.to_owned(),
            });
        }

        outcome?;
        info!(
            processed = report.files_processed,
            total = report.total_files,
            malformed = report.malformed_lines,
            cancelled = report.cancelled,
            "backfill finished"
        );
        Ok(report)
    }

    fn replay_files(
        &self,
        files: &[PathBuf],
        cancel: &CancelToken,
        tracker: &mut SessionTracker,
        report: &mut BackfillReport,
        on_progress: &mut impl FnMut(usize, usize, &str),
    ) -> Result<()> {
        for path in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                info!(done = report.files_processed, "backfill cancelled");
                return Ok(());
            }
            match self.replay_file(path, tracker) {
                Ok(malformed) => {
                    report.files_processed += 1;
                    report.malformed_lines += malformed;
                }
                Err(err @ StarlogError::Io(_)) => {
                    // Unreadable file: skip it, keep the rest of history.
                    warn!(file = %path.display(), %err, "skipping unreadable journal file");
                    report.error = Some(format!("{}: {err}", path.display()));
                }
                Err(err) => return Err(err),
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            on_progress(report.files_processed, report.total_files, &name);
        }
        Ok(())
    }

    fn replay_file(&self, path: &Path, tracker: &mut SessionTracker) -> Result<usize> {
        let file = File::open(path)?;
        let mut malformed = 0;
        for line in BufReader::new(file).lines() {
            let line = line?;
            match journal::parse_line(&line) {
                ParseOutcome::Event(event) => tracker.apply(event)?,
                ParseOutcome::Unrecognized => {}
                ParseOutcome::Malformed => malformed += 1,
            }
        }
        debug!(file = %path.display(), malformed, "journal file replayed");
        Ok(malformed)
    }
}

/// Journal files under `dir`, sorted by file name (chronological: the game
/// embeds a sortable timestamp plus part number).
fn journal_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if journal::is_journal_file(name) && entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
