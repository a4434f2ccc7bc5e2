//! Configuration for the Starlog engine.
//!
//! Maps directly to `starlog.toml`. Every field has a serde default so a
//! partial (or empty) file is always valid.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journal::is_journal_file;

/// Top-level Starlog configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StarlogConfig {
    /// Journal directory and tailing behavior.
    #[serde(default)]
    pub journal: JournalConfig,
    /// Persistent store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl StarlogConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `StarlogError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::StarlogError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

/// Journal directory and tailing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Directory containing the game's journal files. `None` until configured.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Poll interval for the tailer in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Backoff between retries when the directory is unavailable (ms).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: None,
            poll_interval_ms: 250,
            retry_backoff_ms: 2_000,
        }
    }
}

/// Persistent store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Use WAL mode for concurrent reads during ingestion.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            wal_mode: true,
            busy_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Journal folder validation
// ---------------------------------------------------------------------------

/// Result of validating a candidate journal folder.
#[derive(Debug, Clone, Default)]
pub struct JournalFolderReport {
    /// Overall verdict: exists, readable, and contains at least one journal.
    pub valid: bool,
    /// The path exists.
    pub exists: bool,
    /// The path is a readable directory.
    pub readable: bool,
    /// Number of files matching the journal naming convention.
    pub matching_files: usize,
    /// Name of the most recently modified journal file, if any.
    pub latest_file: Option<String>,
    /// Modification time of the latest journal file.
    pub latest_modified: Option<DateTime<Utc>>,
    /// Whether the path is the game's conventional install location.
    pub default_install_detected: bool,
    /// Non-fatal observations about the folder.
    pub warnings: Vec<String>,
    /// Reasons the folder is unusable.
    pub errors: Vec<String>,
}

/// Validate a journal folder without side effects.
///
/// Never returns an error: all problems are reported inside the
/// [`JournalFolderReport`] so callers can present them directly.
#[must_use]
pub fn check_journal_folder(path: &Path) -> JournalFolderReport {
    let mut report = JournalFolderReport {
        default_install_detected: default_install_dir().is_some_and(|d| d == path),
        ..JournalFolderReport::default()
    };

    if !path.exists() {
        report.errors.push(format!("{} does not exist", path.display()));
        return report;
    }
    report.exists = true;

    if !path.is_dir() {
        report.errors.push(format!("{} is not a directory", path.display()));
        return report;
    }

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            report.errors.push(format!("{} is not readable: {e}", path.display()));
            return report;
        }
    };
    report.readable = true;

    let mut latest: Option<(String, std::time::SystemTime)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_journal_file(&name) {
            continue;
        }
        report.matching_files += 1;
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                if latest.as_ref().is_none_or(|(_, t)| modified > *t) {
                    latest = Some((name, modified));
                }
            }
        }
    }

    if let Some((name, modified)) = latest {
        report.latest_file = Some(name);
        report.latest_modified = Some(DateTime::<Utc>::from(modified));
    }

    if report.matching_files == 0 {
        report.warnings.push("No journal files found yet".to_string());
    }

    report.valid = report.exists && report.readable && report.matching_files > 0;
    report
}

/// The game's conventional journal location, if it can be derived from the
/// environment (`Saved Games` under the user profile).
#[must_use]
pub fn default_install_dir() -> Option<PathBuf> {
    let home = std::env::var_os("USERPROFILE").or_else(|| std::env::var_os("HOME"))?;
    Some(
        PathBuf::from(home)
            .join("Saved Games")
            .join("Frontier Developments")
            .join("Elite Dangerous"),
    )
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    250
}
fn default_retry_backoff() -> u64 {
    2_000
}
fn default_busy_timeout() -> u32 {
    5_000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("starlog.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = StarlogConfig::from_toml("").expect("parse");
        assert!(config.journal.directory.is_none());
        assert_eq!(config.journal.poll_interval_ms, 250);
        assert!(config.store.wal_mode);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = StarlogConfig::from_toml(
            r#"
            [journal]
            directory = "/tmp/journals"
            poll_interval_ms = 100
            "#,
        )
        .expect("parse");
        assert_eq!(
            config.journal.directory.as_deref(),
            Some(Path::new("/tmp/journals"))
        );
        assert_eq!(config.journal.poll_interval_ms, 100);
        assert_eq!(config.store.busy_timeout_ms, 5_000);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = StarlogConfig::from_toml("journal = 3").expect_err("should fail");
        assert!(matches!(err, crate::StarlogError::Config(_)));
    }

    #[test]
    fn missing_folder_reports_error() {
        let report = check_journal_folder(Path::new("/definitely/not/here"));
        assert!(!report.valid);
        assert!(!report.exists);
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn empty_folder_warns_but_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = check_journal_folder(dir.path());
        assert!(report.exists);
        assert!(report.readable);
        assert!(!report.valid, "No journals yet");
        assert_eq!(report.matching_files, 0);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn folder_with_journals_is_valid() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Journal.2024-06-01T120000.01.log"), "{}\n")
            .expect("write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");
        let report = check_journal_folder(dir.path());
        assert!(report.valid);
        assert_eq!(report.matching_files, 1);
        assert_eq!(
            report.latest_file.as_deref(),
            Some("Journal.2024-06-01T120000.01.log")
        );
        assert!(report.latest_modified.is_some());
    }
}
