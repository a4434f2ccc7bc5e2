//! Read-only queries: point lookups, prefix search, paginated route history,
//! and pre-aggregated analytics.
//!
//! Boundary inputs arrive pre-validated; out-of-range pagination is clamped
//! and over-large offsets simply yield empty pages.

use chrono::{DateTime, Utc};
use rusqlite::{Row, params, params_from_iter, types::Value as SqlValue};

use super::{BodyKey, SessionId, Store, SystemId};
use crate::error::Result;

/// Hard cap on page sizes and search results.
const MAX_PAGE: usize = 500;

/// A stored system row.
#[derive(Debug, Clone)]
pub struct SystemRow {
    /// Row id.
    pub id: SystemId,
    /// System name.
    pub name: String,
    /// Galactic coordinates, when known.
    pub pos: Option<[f64; 3]>,
    /// Primary star class, when known.
    pub primary_star_class: Option<String>,
    /// Total body count from the discovery scanner.
    pub body_count: i64,
    /// First visit timestamp.
    pub first_visited: Option<DateTime<Utc>>,
    /// Most recent visit timestamp.
    pub last_visited: Option<DateTime<Utc>>,
    /// Summed earned value of the system's bodies.
    pub scan_value: i64,
    /// Summed maximum value of the system's bodies.
    pub mapped_value: i64,
}

/// A stored body row.
#[derive(Debug, Clone)]
pub struct BodyRow {
    /// Row id.
    pub key: BodyKey,
    /// Body index within the system.
    pub body_id: i64,
    /// Journal body name.
    pub name: Option<String>,
    /// Star class or planet class.
    pub sub_class: Option<String>,
    /// Terraforming state.
    pub terraform_state: Option<String>,
    /// Distance from arrival in light seconds.
    pub distance_ls: Option<f64>,
    /// Landable flag.
    pub landable: bool,
    /// Previously discovered by someone else.
    pub was_discovered: bool,
    /// Previously mapped by someone else.
    pub was_mapped: bool,
    /// Scanned by this commander.
    pub scanned: bool,
    /// Mapped by this commander.
    pub mapped: bool,
    /// Value earned so far.
    pub current_value: i64,
    /// Maximum attainable value.
    pub max_value: i64,
}

/// A stored biological detection.
#[derive(Debug, Clone)]
pub struct BioRow {
    /// Genus, when known.
    pub genus: Option<String>,
    /// Species (part of the key).
    pub species: String,
    /// Highest stage reached (1..=3).
    pub scan_stage: i64,
    /// Voucher value in credits.
    pub voucher: i64,
    /// First logged by this commander.
    pub first_logged: bool,
}

/// Filters for the paginated route history.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    /// Case-insensitive substring match on origin or destination.
    pub text: Option<String>,
    /// Inclusive lower bound on jump time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on jump time.
    pub to: Option<DateTime<Utc>>,
    /// Restrict to one session.
    pub session: Option<SessionId>,
    /// Page size (clamped to 1..=500).
    pub limit: usize,
    /// Page offset.
    pub offset: usize,
}

impl Default for RouteFilter {
    fn default() -> Self {
        Self {
            text: None,
            from: None,
            to: None,
            session: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// One route-history entry with its frozen destination snapshot.
#[derive(Debug, Clone)]
pub struct RouteRow {
    /// Row id.
    pub id: i64,
    /// Session the jump belongs to.
    pub session_id: Option<SessionId>,
    /// System jumped from.
    pub origin: Option<String>,
    /// Destination system.
    pub destination: String,
    /// Jump distance in light years.
    pub distance_ly: f64,
    /// Fuel spent, in tons.
    pub fuel_used: f64,
    /// Jump timestamp.
    pub jumped_at: Option<DateTime<Utc>>,
    /// Destination star class at arrival time.
    pub star_class: Option<String>,
    /// Destination body count at arrival time.
    pub body_count: i64,
    /// Destination earned value at arrival time.
    pub scan_value: i64,
    /// Destination maximum value at arrival time.
    pub mapped_value: i64,
}

/// A page of route history plus the unpaginated total for the same filter.
#[derive(Debug, Clone)]
pub struct RoutePage {
    /// Matching entries, newest first.
    pub entries: Vec<RouteRow>,
    /// Total matching rows regardless of pagination.
    pub total: usize,
}

/// Whole-store row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Systems on record.
    pub systems: usize,
    /// Bodies on record.
    pub bodies: usize,
    /// Biological detections on record.
    pub bio_detections: usize,
    /// Codex entries on record.
    pub codex_entries: usize,
    /// Route-history entries on record.
    pub jumps: usize,
    /// Sessions on record.
    pub sessions: usize,
}

/// Per-session rollup of jumps and discoveries made inside its time window.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Session start.
    pub started_at: Option<DateTime<Utc>>,
    /// Session end, when closed.
    pub ended_at: Option<DateTime<Utc>>,
    /// Jumps made during the session.
    pub jump_count: i64,
    /// Bodies scanned during the session window.
    pub bodies_scanned: i64,
    /// Codex entries logged during the session window.
    pub codex_logged: i64,
}

/// One label/count pair from an aggregate breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    /// Group label (body class, genus, category, date).
    pub label: String,
    /// Row count for the group.
    pub count: i64,
}

impl Store {
    // ------------------------------------------------------------------
    // Point lookups & search
    // ------------------------------------------------------------------

    /// Look up a system by row id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn system_by_id(&self, id: SystemId) -> Result<Option<SystemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{SYSTEM_SELECT} WHERE id = ?1"
            ))?;
            let mut rows = stmt.query_map(params![id.0], system_from_row)?;
            Ok(rows.next().transpose()?)
        })
    }

    /// Look up a system by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn system_by_name(&self, name: &str) -> Result<Option<SystemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{SYSTEM_SELECT} WHERE name = ?1 COLLATE NOCASE"
            ))?;
            let mut rows = stmt.query_map(params![name], system_from_row)?;
            Ok(rows.next().transpose()?)
        })
    }

    /// Prefix search over system names, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn search_systems(&self, prefix: &str, limit: usize) -> Result<Vec<SystemRow>> {
        let limit = limit.clamp(1, MAX_PAGE);
        // LIKE wildcards in the prefix would widen the search.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{SYSTEM_SELECT} WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT ?2"
            ))?;
            let rows = stmt.query_map(
                params![format!("{escaped}%"), limit as i64],
                system_from_row,
            )?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// All bodies of a system, ordered by body index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn bodies_for_system(&self, system: SystemId) -> Result<Vec<BodyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, body_id, name, sub_class, terraform_state, distance_ls, landable,
                        was_discovered, was_mapped, scanned, mapped, current_value, max_value
                 FROM bodies WHERE system_id = ?1 ORDER BY body_id",
            )?;
            let rows = stmt.query_map(params![system.0], |row| {
                Ok(BodyRow {
                    key: BodyKey(row.get(0)?),
                    body_id: row.get(1)?,
                    name: row.get(2)?,
                    sub_class: row.get(3)?,
                    terraform_state: row.get(4)?,
                    distance_ls: row.get(5)?,
                    landable: row.get(6)?,
                    was_discovered: row.get(7)?,
                    was_mapped: row.get(8)?,
                    scanned: row.get(9)?,
                    mapped: row.get(10)?,
                    current_value: row.get(11)?,
                    max_value: row.get(12)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// All biological detections recorded for one body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn bio_for_body(&self, body: BodyKey) -> Result<Vec<BioRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT genus, species, scan_stage, voucher, first_logged
                 FROM bio_detections WHERE body_key = ?1 ORDER BY species",
            )?;
            let rows = stmt.query_map(params![body.0], |row| {
                Ok(BioRow {
                    genus: row.get(0)?,
                    species: row.get(1)?,
                    scan_stage: row.get(2)?,
                    voucher: row.get(3)?,
                    first_logged: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    // ------------------------------------------------------------------
    // Route history
    // ------------------------------------------------------------------

    /// Paginated route history, newest first, with the unpaginated total.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn route_page(&self, filter: &RouteFilter) -> Result<RoutePage> {
        let limit = filter.limit.clamp(1, MAX_PAGE);

        let mut clauses: Vec<&str> = Vec::new();
        let mut bind: Vec<SqlValue> = Vec::new();

        if let Some(text) = filter.text.as_deref().filter(|t| !t.is_empty()) {
            clauses.push("(origin LIKE ? OR destination LIKE ?)");
            let pattern = format!("%{text}%");
            bind.push(SqlValue::Text(pattern.clone()));
            bind.push(SqlValue::Text(pattern));
        }
        if let Some(from) = filter.from {
            clauses.push("jumped_at >= ?");
            bind.push(SqlValue::Text(from.to_rfc3339()));
        }
        if let Some(to) = filter.to {
            clauses.push("jumped_at <= ?");
            bind.push(SqlValue::Text(to.to_rfc3339()));
        }
        if let Some(session) = filter.session {
            clauses.push("session_id = ?");
            bind.push(SqlValue::Integer(session.0));
        }

        let where_sql = build_where(&clauses);

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM route_history {where_sql}"),
                params_from_iter(bind.iter()),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT id, session_id, origin, destination, distance_ly, fuel_used,
                        jumped_at, star_class, body_count, scan_value, mapped_value
                 FROM route_history {where_sql}
                 ORDER BY jumped_at DESC, id DESC
                 LIMIT {limit} OFFSET {offset}",
                offset = filter.offset,
            ))?;
            let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
                Ok(RouteRow {
                    id: row.get(0)?,
                    session_id: row.get::<_, Option<i64>>(1)?.map(SessionId),
                    origin: row.get(2)?,
                    destination: row.get(3)?,
                    distance_ly: row.get(4)?,
                    fuel_used: row.get(5)?,
                    jumped_at: parse_ts(row.get::<_, Option<String>>(6)?),
                    star_class: row.get(7)?,
                    body_count: row.get(8)?,
                    scan_value: row.get(9)?,
                    mapped_value: row.get(10)?,
                })
            })?;
            Ok(RoutePage {
                entries: rows.collect::<std::result::Result<Vec<_>, _>>()?,
                total: usize::try_from(total).unwrap_or(0),
            })
        })
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Whole-store row counts.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> std::result::Result<usize, rusqlite::Error> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| usize::try_from(n).unwrap_or(0))
            };
            Ok(StoreStats {
                systems: count("systems")?,
                bodies: count("bodies")?,
                bio_detections: count("bio_detections")?,
                codex_entries: count("codex_entries")?,
                jumps: count("route_history")?,
                sessions: count("sessions")?,
            })
        })
    }

    /// Jumps per calendar day within the (optional) bounds, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn jumps_per_day(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Breakdown>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind: Vec<SqlValue> = Vec::new();
        if let Some(from) = from {
            clauses.push("jumped_at >= ?");
            bind.push(SqlValue::Text(from.to_rfc3339()));
        }
        if let Some(to) = to {
            clauses.push("jumped_at <= ?");
            bind.push(SqlValue::Text(to.to_rfc3339()));
        }
        let where_sql = build_where(&clauses);
        self.breakdown(
            &format!(
                "SELECT date(jumped_at) AS day, COUNT(*) FROM route_history {where_sql}
                 GROUP BY day ORDER BY day"
            ),
            &bind,
        )
    }

    /// Per-session jump and discovery rollups, oldest first.
    ///
    /// Bodies and codex entries are attributed by the session's time window;
    /// rows without an end use the window start onwards.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn session_summaries(&self) -> Result<Vec<SessionSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT s.id, s.started_at, s.ended_at, s.jump_count,
                        (SELECT COUNT(*) FROM bodies b
                          WHERE b.scanned_at >= s.started_at
                            AND (s.ended_at IS NULL OR b.scanned_at <= s.ended_at)),
                        (SELECT COUNT(*) FROM codex_entries c
                          WHERE c.logged_at >= s.started_at
                            AND (s.ended_at IS NULL OR c.logged_at <= s.ended_at))
                 FROM sessions s ORDER BY s.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(SessionSummary {
                    id: SessionId(row.get(0)?),
                    started_at: parse_ts(row.get::<_, Option<String>>(1)?),
                    ended_at: parse_ts(row.get::<_, Option<String>>(2)?),
                    jump_count: row.get(3)?,
                    bodies_scanned: row.get(4)?,
                    codex_logged: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }

    /// Body counts grouped by classification, most common first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn body_type_distribution(&self) -> Result<Vec<Breakdown>> {
        self.breakdown(
            "SELECT COALESCE(sub_class, 'Unknown'), COUNT(*) FROM bodies
             GROUP BY sub_class ORDER BY COUNT(*) DESC",
            &[],
        )
    }

    /// Biological detections grouped by genus, most common first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn bio_breakdown(&self) -> Result<Vec<Breakdown>> {
        self.breakdown(
            "SELECT COALESCE(genus, 'Unknown'), COUNT(*) FROM bio_detections
             GROUP BY genus ORDER BY COUNT(*) DESC",
            &[],
        )
    }

    /// Codex entries grouped by category, most common first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StarlogError::Database`] on SQLite failures.
    pub fn codex_breakdown(&self) -> Result<Vec<Breakdown>> {
        self.breakdown(
            "SELECT COALESCE(category, 'Unknown'), COUNT(*) FROM codex_entries
             GROUP BY category ORDER BY COUNT(*) DESC",
            &[],
        )
    }

    fn breakdown(&self, sql: &str, bind: &[SqlValue]) -> Result<Vec<Breakdown>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
                Ok(Breakdown {
                    label: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
    }
}

const SYSTEM_SELECT: &str = "SELECT id, name, x, y, z, primary_star_class, body_count,
        first_visited, last_visited, scan_value, mapped_value FROM systems";

fn system_from_row(row: &Row<'_>) -> std::result::Result<SystemRow, rusqlite::Error> {
    let x: Option<f64> = row.get(2)?;
    let y: Option<f64> = row.get(3)?;
    let z: Option<f64> = row.get(4)?;
    Ok(SystemRow {
        id: SystemId(row.get(0)?),
        name: row.get(1)?,
        pos: match (x, y, z) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        },
        primary_star_class: row.get(5)?,
        body_count: row.get(6)?,
        first_visited: parse_ts(row.get::<_, Option<String>>(7)?),
        last_visited: parse_ts(row.get::<_, Option<String>>(8)?),
        scan_value: row.get(9)?,
        mapped_value: row.get(10)?,
    })
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn build_where(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}
