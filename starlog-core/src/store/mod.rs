//! SQLite persistent store for the exploration record.
//!
//! Schema overview:
//!
//! ```sql
//! systems        -- natural key: name (case-insensitive)
//! bodies         -- UNIQUE(system_id, body_id), COALESCE-merge upserts
//! bio_detections -- UNIQUE(body_key, species), stage only ratchets up
//! codex_entries  -- append-only discovery catalogue
//! sessions       -- play periods with jump counts
//! route_history  -- append-only, denormalized destination snapshot
//! ```
//!
//! - WAL mode keeps readers responsive while ingestion writes.
//! - Ordinary ingestion only inserts/upserts; only import and reset delete.
//! - The connection lives behind `Mutex<Option<_>>`: the `None` window exists
//!   only while an import swaps the database file, and queries in that window
//!   fail with [`StarlogError::StoreUnavailable`] instead of hanging.

pub mod maintenance;
pub mod query;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StarlogError};
use crate::journal::CodexObservation;

/// Row id of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub i64);

/// Row id of a body (not the in-system body index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyKey(pub i64);

/// Row id of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS systems (
    id                 INTEGER PRIMARY KEY,
    name               TEXT NOT NULL UNIQUE COLLATE NOCASE,
    x                  REAL,
    y                  REAL,
    z                  REAL,
    primary_star_class TEXT,
    body_count         INTEGER NOT NULL DEFAULT 0,
    first_visited      TEXT,
    last_visited       TEXT,
    scan_value         INTEGER NOT NULL DEFAULT 0,
    mapped_value       INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bodies (
    id              INTEGER PRIMARY KEY,
    system_id       INTEGER NOT NULL REFERENCES systems(id) ON DELETE CASCADE,
    body_id         INTEGER NOT NULL,
    name            TEXT,
    body_type       TEXT,
    sub_class       TEXT,
    terraform_state TEXT,
    distance_ls     REAL,
    landable        INTEGER NOT NULL DEFAULT 0,
    mass            REAL,
    radius          REAL,
    surface_gravity REAL,
    was_discovered  INTEGER NOT NULL DEFAULT 0,
    was_mapped      INTEGER NOT NULL DEFAULT 0,
    scanned         INTEGER NOT NULL DEFAULT 0,
    mapped          INTEGER NOT NULL DEFAULT 0,
    current_value   INTEGER NOT NULL DEFAULT 0,
    max_value       INTEGER NOT NULL DEFAULT 0,
    scanned_at      TEXT,
    UNIQUE (system_id, body_id)
);

CREATE TABLE IF NOT EXISTS bio_detections (
    id           INTEGER PRIMARY KEY,
    body_key     INTEGER NOT NULL REFERENCES bodies(id) ON DELETE CASCADE,
    genus        TEXT,
    species      TEXT NOT NULL,
    scan_stage   INTEGER NOT NULL DEFAULT 0,
    voucher      INTEGER NOT NULL DEFAULT 0,
    first_logged INTEGER NOT NULL DEFAULT 0,
    updated_at   TEXT,
    UNIQUE (body_key, species)
);

CREATE TABLE IF NOT EXISTS codex_entries (
    id           INTEGER PRIMARY KEY,
    category     TEXT,
    sub_category TEXT,
    region       TEXT,
    name         TEXT NOT NULL,
    voucher      INTEGER NOT NULL DEFAULT 0,
    is_new       INTEGER NOT NULL DEFAULT 0,
    logged_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id         INTEGER PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at   TEXT,
    jump_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS route_history (
    id           INTEGER PRIMARY KEY,
    session_id   INTEGER REFERENCES sessions(id),
    origin       TEXT,
    destination  TEXT NOT NULL,
    distance_ly  REAL NOT NULL DEFAULT 0,
    fuel_used    REAL NOT NULL DEFAULT 0,
    jumped_at    TEXT NOT NULL,
    star_class   TEXT,
    body_count   INTEGER NOT NULL DEFAULT 0,
    scan_value   INTEGER NOT NULL DEFAULT 0,
    mapped_value INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_bodies_system ON bodies(system_id);
CREATE INDEX IF NOT EXISTS idx_route_jumped_at ON route_history(jumped_at);
CREATE INDEX IF NOT EXISTS idx_route_session ON route_history(session_id);
CREATE INDEX IF NOT EXISTS idx_codex_logged_at ON codex_entries(logged_at);
";

/// Fields known about a system at a point in time. Absent fields leave the
/// stored row untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemPatch {
    /// System name (the natural key).
    pub name: String,
    /// Galactic coordinates.
    pub pos: Option<[f64; 3]>,
    /// Class of the primary star.
    pub primary_star_class: Option<String>,
    /// Total body count from the discovery scanner.
    pub body_count: Option<u32>,
    /// Set only when the commander was physically present.
    pub visited_at: Option<DateTime<Utc>>,
}

/// Fields known about a body at a point in time.
///
/// Partial scans (surface vs. remote, either order) each produce one patch;
/// [`BodyPatch::merge`] folds them together, and the SQL upsert applies the
/// same semantics against the stored row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPatch {
    /// Body index within the system (part of the composite key).
    pub body_id: i64,
    /// Journal body name.
    pub name: Option<String>,
    /// "Star" or "Planet".
    pub body_type: Option<String>,
    /// Star class or planet class.
    pub sub_class: Option<String>,
    /// Terraforming state.
    pub terraform_state: Option<String>,
    /// Distance from arrival in light seconds.
    pub distance_ls: Option<f64>,
    /// Landable flag.
    pub landable: Option<bool>,
    /// Mass (earth or solar masses).
    pub mass: Option<f64>,
    /// Radius in meters.
    pub radius: Option<f64>,
    /// Surface gravity in m/s².
    pub surface_gravity: Option<f64>,
    /// Previously discovered by someone else.
    pub was_discovered: Option<bool>,
    /// Previously mapped by someone else.
    pub was_mapped: Option<bool>,
    /// This commander has scanned the body.
    pub scanned: Option<bool>,
    /// This commander has surface-mapped the body.
    pub mapped: Option<bool>,
    /// Estimated value as earned so far.
    pub current_value: Option<i64>,
    /// Estimated maximum attainable value.
    pub max_value: Option<i64>,
    /// When the body was (last) scanned.
    pub scanned_at: Option<DateTime<Utc>>,
}

impl BodyPatch {
    /// Fold `newer` into `self`: fields present in `newer` win, absent fields
    /// keep their value. Idempotent, and commutative whenever the two patches
    /// touch disjoint fields (the partial-scan case).
    pub fn merge(&mut self, newer: &Self) {
        macro_rules! take {
            ($field:ident) => {
                if newer.$field.is_some() {
                    self.$field = newer.$field.clone();
                }
            };
        }
        take!(name);
        take!(body_type);
        take!(sub_class);
        take!(terraform_state);
        take!(distance_ls);
        take!(landable);
        take!(mass);
        take!(radius);
        take!(surface_gravity);
        take!(was_discovered);
        take!(was_mapped);
        take!(scanned);
        take!(mapped);
        take!(current_value);
        take!(max_value);
        take!(scanned_at);
    }
}

/// One hyperspace jump to append to the route history.
#[derive(Debug, Clone)]
pub struct JumpRecord {
    /// Active session, if one is open.
    pub session_id: Option<SessionId>,
    /// System jumped from.
    pub origin: Option<String>,
    /// Destination system name.
    pub destination: String,
    /// Jump distance in light years.
    pub distance_ly: f64,
    /// Fuel spent, in tons.
    pub fuel_used: f64,
    /// Jump timestamp.
    pub at: DateTime<Utc>,
}

/// Handle to the open exploration database.
pub struct Store {
    conn: Mutex<Option<Connection>>,
    config: StoreConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database at `config.db_path`.
    ///
    /// This is the only process-fatal failure point: an unusable store means
    /// the engine cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = config.db_path.clone();
        let conn = open_connection(&db_path, config)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "exploration store opened"
        );

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            config: StoreConfig::default(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the live connection, or fail with `StoreUnavailable`
    /// when an import has the database file swapped out.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StarlogError::StoreUnavailable(
                "maintenance in progress".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Ingestion upserts
    // ------------------------------------------------------------------

    /// Insert or update a system by name. Returns its row id.
    ///
    /// Absent patch fields never overwrite stored values; `first_visited` is
    /// written once, `last_visited` ratchets forward, `body_count` ratchets up.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn upsert_system(&self, patch: &SystemPatch) -> Result<SystemId> {
        self.with_conn(|conn| {
            let visited = patch.visited_at.map(|t| t.to_rfc3339());
            let (x, y, z) = match patch.pos {
                Some([x, y, z]) => (Some(x), Some(y), Some(z)),
                None => (None, None, None),
            };
            let id: i64 = conn.query_row(
                "INSERT INTO systems (name, x, y, z, primary_star_class, body_count,
                                      first_visited, last_visited)
                 VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 0), ?7, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                    x = COALESCE(excluded.x, x),
                    y = COALESCE(excluded.y, y),
                    z = COALESCE(excluded.z, z),
                    primary_star_class = COALESCE(excluded.primary_star_class, primary_star_class),
                    body_count = MAX(body_count, COALESCE(excluded.body_count, 0)),
                    first_visited = COALESCE(first_visited, excluded.first_visited),
                    last_visited = MAX(COALESCE(excluded.last_visited, last_visited),
                                       COALESCE(last_visited, excluded.last_visited))
                 RETURNING id",
                params![
                    patch.name,
                    x,
                    y,
                    z,
                    patch.primary_star_class,
                    patch.body_count,
                    visited,
                ],
                |row| row.get(0),
            )?;
            debug!(system = %patch.name, id, "system upserted");
            Ok(SystemId(id))
        })
    }

    /// Insert or merge a body row keyed by `(system_id, body_id)`.
    ///
    /// Re-scans update in place; scan/mapped flags and value fields only
    /// ratchet up. The owning system's summary values are refreshed in the
    /// same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn upsert_body(&self, system: SystemId, patch: &BodyPatch) -> Result<BodyKey> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let id: i64 = tx.query_row(
                "INSERT INTO bodies (system_id, body_id, name, body_type, sub_class,
                                     terraform_state, distance_ls, landable, mass, radius,
                                     surface_gravity, was_discovered, was_mapped, scanned,
                                     mapped, current_value, max_value, scanned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, COALESCE(?8, 0), ?9, ?10, ?11,
                         COALESCE(?12, 0), COALESCE(?13, 0), COALESCE(?14, 0),
                         COALESCE(?15, 0), COALESCE(?16, 0), COALESCE(?17, 0), ?18)
                 ON CONFLICT(system_id, body_id) DO UPDATE SET
                    name = COALESCE(excluded.name, name),
                    body_type = COALESCE(excluded.body_type, body_type),
                    sub_class = COALESCE(excluded.sub_class, sub_class),
                    terraform_state = COALESCE(excluded.terraform_state, terraform_state),
                    distance_ls = COALESCE(excluded.distance_ls, distance_ls),
                    landable = MAX(landable, excluded.landable),
                    mass = COALESCE(excluded.mass, mass),
                    radius = COALESCE(excluded.radius, radius),
                    surface_gravity = COALESCE(excluded.surface_gravity, surface_gravity),
                    was_discovered = MAX(was_discovered, excluded.was_discovered),
                    was_mapped = MAX(was_mapped, excluded.was_mapped),
                    scanned = MAX(scanned, excluded.scanned),
                    mapped = MAX(mapped, excluded.mapped),
                    current_value = MAX(current_value, excluded.current_value),
                    max_value = MAX(max_value, excluded.max_value),
                    scanned_at = COALESCE(excluded.scanned_at, scanned_at)
                 RETURNING id",
                params![
                    system.0,
                    patch.body_id,
                    patch.name,
                    patch.body_type,
                    patch.sub_class,
                    patch.terraform_state,
                    patch.distance_ls,
                    patch.landable,
                    patch.mass,
                    patch.radius,
                    patch.surface_gravity,
                    patch.was_discovered,
                    patch.was_mapped,
                    patch.scanned,
                    patch.mapped,
                    patch.current_value,
                    patch.max_value,
                    patch.scanned_at.map(|t| t.to_rfc3339()),
                ],
                |row| row.get(0),
            )?;

            // Keep the system's summary values in sync with its bodies.
            tx.execute(
                "UPDATE systems SET
                    scan_value = (SELECT COALESCE(SUM(current_value), 0)
                                  FROM bodies WHERE system_id = ?1),
                    mapped_value = (SELECT COALESCE(SUM(max_value), 0)
                                    FROM bodies WHERE system_id = ?1)
                 WHERE id = ?1",
                params![system.0],
            )?;
            tx.commit()?;
            Ok(BodyKey(id))
        })
    }

    /// Insert or advance a biological detection for `(body, species)`.
    ///
    /// The scan stage is monotonic: replays and out-of-order lines can never
    /// regress it.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn upsert_bio(
        &self,
        body: BodyKey,
        genus: Option<&str>,
        species: &str,
        stage: u8,
        voucher: i64,
        first_logged: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bio_detections (body_key, genus, species, scan_stage, voucher,
                                             first_logged, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(body_key, species) DO UPDATE SET
                    genus = COALESCE(excluded.genus, genus),
                    scan_stage = MAX(scan_stage, excluded.scan_stage),
                    voucher = MAX(voucher, excluded.voucher),
                    first_logged = MAX(first_logged, excluded.first_logged),
                    updated_at = excluded.updated_at",
                params![
                    body.0,
                    genus,
                    species,
                    i64::from(stage),
                    voucher,
                    first_logged,
                    at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Append a codex entry. Duplicates across time are legitimate.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn insert_codex(&self, entry: &CodexObservation, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO codex_entries (category, sub_category, region, name, voucher,
                                            is_new, logged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.category,
                    entry.sub_category,
                    entry.region,
                    entry.name,
                    entry.voucher,
                    entry.is_new,
                    at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Sessions & route history
    // ------------------------------------------------------------------

    /// Open a new session starting at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn open_session(&self, at: DateTime<Utc>) -> Result<SessionId> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (started_at) VALUES (?1)",
                params![at.to_rfc3339()],
            )?;
            let id = conn.last_insert_rowid();
            debug!(session = id, "session opened");
            Ok(SessionId(id))
        })
    }

    /// Close a session at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn close_session(&self, session: SessionId, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = ?2 WHERE id = ?1",
                params![session.0, at.to_rfc3339()],
            )?;
            debug!(session = session.0, "session closed");
            Ok(())
        })
    }

    /// Append a route-history entry and bump the session jump count in one
    /// transaction; readers never see one without the other.
    ///
    /// The destination system's summary fields (star class, body count,
    /// values) are snapshotted as they stand right now; later re-scans do
    /// not retroactively change the stored entry.
    ///
    /// # Errors
    ///
    /// Returns [`StarlogError::Database`] on SQLite failures.
    pub fn record_jump(&self, jump: &JumpRecord) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let snapshot: (Option<String>, i64, i64, i64) = tx
                .query_row(
                    "SELECT primary_star_class, body_count, scan_value, mapped_value
                     FROM systems WHERE name = ?1",
                    params![jump.destination],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?
                .unwrap_or((None, 0, 0, 0));

            tx.execute(
                "INSERT INTO route_history (session_id, origin, destination, distance_ly,
                                            fuel_used, jumped_at, star_class, body_count,
                                            scan_value, mapped_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    jump.session_id.map(|s| s.0),
                    jump.origin,
                    jump.destination,
                    jump.distance_ly,
                    jump.fuel_used,
                    jump.at.to_rfc3339(),
                    snapshot.0,
                    snapshot.1,
                    snapshot.2,
                    snapshot.3,
                ],
            )?;

            if let Some(session) = jump.session_id {
                tx.execute(
                    "UPDATE sessions SET jump_count = jump_count + 1 WHERE id = ?1",
                    params![session.0],
                )?;
            }

            tx.commit()?;
            debug!(destination = %jump.destination, "jump recorded");
            Ok(())
        })
    }
}

/// Open a connection with the standard pragmas and schema.
pub(crate) fn open_connection(path: &Path, config: &StoreConfig) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;

    if config.wal_mode {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}
