//! Live journal tailing.
//!
//! A dedicated thread follows the newest journal file in the configured
//! directory, feeding complete lines to a [`SessionTracker`]. Filesystem
//! notifications wake the loop early; a poll interval bounds the latency
//! either way, so a missed notification only delays a line, never loses it.
//!
//! Invariants:
//! - On startup the current file's existing content is skipped (history is
//!   backfill's job); everything appended afterwards is ingested.
//! - A partial line at EOF stays buffered until its newline arrives; lines
//!   are never split.
//! - On rotation the old file is drained to its end before the switch, so
//!   no trailing lines are lost.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::backfill::IngestGate;
use crate::config::JournalConfig;
use crate::events::{CompanionEvent, EventBus};
use crate::journal::{self, ParseOutcome};
use crate::state::SessionTracker;
use crate::store::Store;

/// Handle to the tailing thread.
pub struct JournalWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl JournalWatcher {
    /// Start tailing `config.directory` on a dedicated thread.
    ///
    /// A missing or not-yet-created directory is not an error: the thread
    /// keeps retrying with `retry_backoff_ms` until it appears.
    #[must_use]
    pub fn spawn(
        config: JournalConfig,
        store: Arc<Store>,
        bus: EventBus,
        gate: Arc<IngestGate>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("journal-tail".to_string())
            .spawn(move || {
                Tailer {
                    config,
                    bus: bus.clone(),
                    gate,
                    stop: worker_stop,
                    tracker: SessionTracker::new(store, bus),
                }
                .run();
            })
            .ok();
        if handle.is_none() {
            error!("failed to spawn journal tail thread");
        }
        Self { stop, handle }
    }

    /// Ask the thread to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for JournalWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct TailedFile {
    path: PathBuf,
    offset: u64,
    /// Bytes read past the last newline; prefix of the next line.
    partial: Vec<u8>,
}

struct Tailer {
    config: JournalConfig,
    bus: EventBus,
    gate: Arc<IngestGate>,
    stop: Arc<AtomicBool>,
    tracker: SessionTracker,
}

impl Tailer {
    fn run(mut self) {
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));
        let backoff = Duration::from_millis(self.config.retry_backoff_ms.max(10));

        let Some(dir) = self.config.directory.clone() else {
            warn!("no journal directory configured, tail thread exiting");
            return;
        };
        info!(dir = %dir.display(), "journal tailing started");

        let mut current: Option<TailedFile> = None;
        // Content already on disk at attach time belongs to backfill.
        let mut skip_existing = true;
        let mut wakeups: Option<(notify::RecommendedWatcher, Receiver<()>)> = None;

        while !self.stop.load(Ordering::Acquire) {
            if !dir.is_dir() {
                if current.take().is_some() || wakeups.take().is_some() {
                    warn!(dir = %dir.display(), "journal directory disappeared");
                }
                self.sleep(backoff);
                continue;
            }
            if wakeups.is_none() {
                wakeups = watch_directory(&dir);
            }

            let Some(latest) = latest_journal(&dir) else {
                self.sleep(poll);
                continue;
            };

            let switched = match &current {
                Some(file) => file.path != latest,
                None => true,
            };
            if switched && !self.switch_to(&mut current, latest, skip_existing) {
                // Backfill holds the gate; try again next tick.
                self.sleep(poll);
                continue;
            }
            skip_existing = false;

            if !self.gate.is_backfilling() {
                if let Some(file) = &mut current {
                    self.ingest_new_bytes(file);
                }
            }

            self.wait(wakeups.as_ref().map(|(_, rx)| rx), poll);
        }
        debug!("journal tailing stopped");
    }

    /// Drain the old file and attach to `latest`. Returns false when the
    /// ingest gate refuses the switch.
    fn switch_to(
        &mut self,
        current: &mut Option<TailedFile>,
        latest: PathBuf,
        skip_existing: bool,
    ) -> bool {
        if !self.gate.begin_switch() {
            return false;
        }
        if let Some(old) = current.as_mut() {
            // Rotation: whatever the old file still holds comes first.
            self.ingest_new_bytes(old);
        }

        let offset = if skip_existing {
            std::fs::metadata(&latest).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        let name = latest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(file = %name, offset, "tailing journal file");

        *current = Some(TailedFile {
            path: latest,
            offset,
            partial: Vec::new(),
        });
        self.bus.emit(CompanionEvent::FileChanged { file: name });
        self.gate.end_switch();
        true
    }

    /// Read everything appended since `file.offset` and apply the complete
    /// lines in it.
    fn ingest_new_bytes(&mut self, file: &mut TailedFile) {
        let mut handle = match File::open(&file.path) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(file = %file.path.display(), %err, "journal file unreadable");
                return;
            }
        };
        if handle.seek(SeekFrom::Start(file.offset)).is_err() {
            return;
        }
        let mut buf = Vec::new();
        match handle.read_to_end(&mut buf) {
            Ok(0) => return,
            Ok(n) => file.offset += n as u64,
            Err(err) => {
                warn!(file = %file.path.display(), %err, "journal read failed");
                return;
            }
        }

        // Bytes, not chars: a half-written multi-byte character at EOF must
        // not poison the read.
        file.partial.extend_from_slice(&buf);
        while let Some(newline) = file.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = file.partial.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            self.apply_line(line.trim_end());
        }
    }

    fn apply_line(&mut self, line: &str) {
        match journal::parse_line(line) {
            ParseOutcome::Event(event) => {
                if let Err(err) = self.tracker.apply(event) {
                    // Store hiccups (import window, disk) must not kill the
                    // tail loop; the line is lost, the stream continues.
                    error!(%err, "failed to apply journal event");
                }
            }
            ParseOutcome::Unrecognized => {}
            ParseOutcome::Malformed => {
                warn!(line, "malformed journal line");
            }
        }
    }

    fn wait(&self, rx: Option<&Receiver<()>>, poll: Duration) {
        match rx {
            Some(rx) => match rx.recv_timeout(poll) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {
                    // Coalesce bursts of notifications into one pass.
                    while rx.try_recv().is_ok() {}
                }
                Err(RecvTimeoutError::Disconnected) => self.sleep(poll),
            },
            None => self.sleep(poll),
        }
    }

    fn sleep(&self, duration: Duration) {
        // Bounded sleep so stop requests are honored promptly.
        let step = Duration::from_millis(20);
        let mut remaining = duration;
        while !self.stop.load(Ordering::Acquire) && !remaining.is_zero() {
            let chunk = remaining.min(step);
            std::thread::sleep(chunk);
            remaining = remaining.saturating_sub(chunk);
        }
    }
}

/// Watch `dir` for changes; any event just wakes the tail loop.
fn watch_directory(dir: &Path) -> Option<(notify::RecommendedWatcher, Receiver<()>)> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = match notify::recommended_watcher(move |res| {
        if let Ok(_event) = res {
            let _ = tx.send(());
        }
    }) {
        Ok(watcher) => watcher,
        Err(err) => {
            // Polling still works without notifications, just slower.
            warn!(%err, "filesystem watcher unavailable, falling back to polling");
            return None;
        }
    };
    if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        warn!(dir = %dir.display(), %err, "failed to watch journal directory");
        return None;
    }
    Some((watcher, rx))
}

/// The journal file the game is currently writing: last in name order.
fn latest_journal(dir: &Path) -> Option<PathBuf> {
    let mut best: Option<PathBuf> = None;
    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !journal::is_journal_file(name) {
            continue;
        }
        let path = entry.path();
        if best.as_ref().is_none_or(|b| {
            b.file_name().map(std::ffi::OsStr::to_os_string)
                < path.file_name().map(std::ffi::OsStr::to_os_string)
        }) {
            best = Some(path);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write as _;
    use std::time::Instant;

    use tokio::sync::mpsc::UnboundedReceiver;

    fn fast_config(dir: &Path) -> JournalConfig {
        JournalConfig {
            directory: Some(dir.to_path_buf()),
            poll_interval_ms: 20,
            retry_backoff_ms: 40,
        }
    }

    fn append(path: &Path, line: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open");
        writeln!(file, "{line}").expect("append");
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn spawn_watcher(
        dir: &Path,
    ) -> (
        JournalWatcher,
        Arc<Store>,
        UnboundedReceiver<CompanionEvent>,
    ) {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let (bus, rx) = EventBus::channel();
        let watcher = JournalWatcher::spawn(
            fast_config(dir),
            Arc::clone(&store),
            bus,
            Arc::new(IngestGate::default()),
        );
        (watcher, store, rx)
    }

    #[test]
    fn existing_content_is_skipped_new_lines_ingested() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = dir.path().join("Journal.2024-06-01T120000.01.log");
        append(
            &journal,
            r#"{"timestamp":"2024-06-01T11:00:00Z","event":"FSDJump","StarSystem":"Old","JumpDist":1.0,"FuelUsed":0.1}"#,
        );

        let (watcher, store, mut rx) = spawn_watcher(dir.path());
        // Wait for the tailer to attach (it announces the file) so the
        // append below is genuinely new content.
        assert!(wait_until(2_000, || {
            matches!(rx.try_recv(), Ok(CompanionEvent::FileChanged { .. }))
        }));
        std::thread::sleep(Duration::from_millis(100));

        append(
            &journal,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"FSDJump","StarSystem":"Maia","JumpDist":9.2,"FuelUsed":1.0}"#,
        );
        assert!(wait_until(3_000, || {
            store.stats().map(|s| s.jumps).unwrap_or(0) == 1
        }));
        assert!(store.system_by_name("Maia").expect("query").is_some());
        assert!(store.system_by_name("Old").expect("query").is_none());
        watcher.stop();
    }

    #[test]
    fn rotation_drains_old_file_then_follows_new() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("Journal.2024-06-01T120000.01.log");
        append(&first, r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Fileheader"}"#);

        let (watcher, store, mut rx) = spawn_watcher(dir.path());
        let mut file_changes = 0;
        assert!(wait_until(2_000, || {
            if matches!(rx.try_recv(), Ok(CompanionEvent::FileChanged { .. })) {
                file_changes += 1;
            }
            file_changes == 1
        }));
        std::thread::sleep(Duration::from_millis(100));

        // Final line of the old file and the rollover, close together.
        append(
            &first,
            r#"{"timestamp":"2024-06-01T13:59:59Z","event":"FSDJump","StarSystem":"Last Of Part One","JumpDist":3.0,"FuelUsed":0.5}"#,
        );
        let second = dir.path().join("Journal.2024-06-01T140000.02.log");
        append(
            &second,
            r#"{"timestamp":"2024-06-01T14:00:01Z","event":"FSDJump","StarSystem":"First Of Part Two","JumpDist":4.0,"FuelUsed":0.6}"#,
        );

        assert!(wait_until(3_000, || {
            store.stats().map(|s| s.jumps).unwrap_or(0) == 2
        }));
        assert!(store
            .system_by_name("Last Of Part One")
            .expect("query")
            .is_some());
        assert!(store
            .system_by_name("First Of Part Two")
            .expect("query")
            .is_some());

        while let Ok(event) = rx.try_recv() {
            if matches!(event, CompanionEvent::FileChanged { .. }) {
                file_changes += 1;
            }
        }
        assert!(file_changes >= 2, "initial attach plus rotation");
        watcher.stop();
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = dir.path().join("Journal.2024-06-01T120000.01.log");
        append(&journal, r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Fileheader"}"#);

        let (watcher, store, mut rx) = spawn_watcher(dir.path());
        assert!(wait_until(2_000, || {
            matches!(rx.try_recv(), Ok(CompanionEvent::FileChanged { .. }))
        }));
        std::thread::sleep(Duration::from_millis(100));

        let line =
            r#"{"timestamp":"2024-06-01T12:01:00Z","event":"FSDJump","StarSystem":"Maia","JumpDist":9.2,"FuelUsed":1.0}"#;
        let (head, tail) = line.split_at(40);
        {
            let mut file = OpenOptions::new().append(true).open(&journal).expect("open");
            write!(file, "{head}").expect("half");
            file.flush().expect("flush");
        }
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(store.stats().expect("stats").jumps, 0, "no newline yet");

        {
            let mut file = OpenOptions::new().append(true).open(&journal).expect("open");
            writeln!(file, "{tail}").expect("rest");
        }
        assert!(wait_until(3_000, || {
            store.stats().map(|s| s.jumps).unwrap_or(0) == 1
        }));
        watcher.stop();
    }

    #[test]
    fn missing_directory_is_retried() {
        let parent = tempfile::tempdir().expect("tempdir");
        let dir = parent.path().join("journals");

        let (watcher, store, mut rx) = spawn_watcher(&dir);
        std::thread::sleep(Duration::from_millis(100));

        std::fs::create_dir(&dir).expect("mkdir");
        let journal = dir.join("Journal.2024-06-01T120000.01.log");
        append(&journal, r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Fileheader"}"#);
        // The append below must land after the tailer has attached, or it
        // would be skipped as pre-existing content.
        assert!(wait_until(3_000, || {
            matches!(rx.try_recv(), Ok(CompanionEvent::FileChanged { .. }))
        }));
        std::thread::sleep(Duration::from_millis(100));
        append(
            &journal,
            r#"{"timestamp":"2024-06-01T12:01:00Z","event":"FSDJump","StarSystem":"Maia","JumpDist":9.2,"FuelUsed":1.0}"#,
        );

        assert!(wait_until(4_000, || {
            store.stats().map(|s| s.jumps).unwrap_or(0) >= 1
        }));
        watcher.stop();
    }
}
