//! Error types for the Starlog core library.

use thiserror::Error;

/// Top-level error type for all Starlog core operations.
#[derive(Error, Debug)]
pub enum StarlogError {
    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store connection is closed (import in progress or shut down).
    ///
    /// Callers should retry once the maintenance window has passed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A backfill is already in progress; at most one may run at a time.
    #[error("Backfill already running")]
    BackfillBusy,

    /// A tailer start/stop transition is mid-flight and holds the ingest gate.
    #[error("Journal tailer is changing files or paths; retry shortly")]
    TailBusy,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structural validation rejected an input (e.g. an import candidate).
    #[error("Validation failed: {reason}")]
    Validation {
        /// Why the input was rejected.
        reason: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, StarlogError>;
