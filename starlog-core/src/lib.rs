//! # Starlog Core Library
//!
//! Journal ingestion and exploration-state derivation for an Elite
//! Dangerous companion. The game appends newline-delimited JSON events to
//! journal files; this crate turns that stream into a durable, queryable
//! exploration record.
//!
//! Pipeline:
//!
//! - [`journal`]: decodes raw lines into typed events
//! - [`state`]: orders events into sessions, visits, scans, and discoveries
//! - [`store`]: persists everything in SQLite and answers queries
//! - [`tail`]: follows the live journal file as the game writes it
//! - [`backfill`]: replays the full journal history into the store
//! - [`events`]: pushes typed updates to whoever is listening
//!
//! Derived state is idempotent under replay: systems, bodies, and
//! biological detections converge to the same rows no matter how often the
//! journal is re-read, and ratcheted fields (scan stages, values, visit
//! times) never regress. Codex entries and route history are append-only
//! records of actual play.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backfill;
pub mod commander;
pub mod config;
pub mod error;
pub mod events;
pub mod journal;
pub mod state;
pub mod store;
pub mod tail;
pub mod value;

pub use backfill::{Backfill, BackfillReport, CancelToken, IngestGate};
pub use commander::CommanderState;
pub use config::{JournalConfig, StarlogConfig, StoreConfig};
pub use error::{Result, StarlogError};
pub use events::{CompanionEvent, EventBus};
pub use journal::{EventKind, JournalEvent, ParseOutcome};
pub use state::SessionTracker;
pub use store::Store;
pub use tail::JournalWatcher;
