//! Session state machine.
//!
//! One [`SessionTracker`] consumes decoded journal events in order and turns
//! them into store writes and outward [`CompanionEvent`]s. It owns all the
//! cross-event context a single line lacks: which system the commander is
//! in, which session is open, which bodies were mapped, and which organisms
//! a body's surface survey predicted.
//!
//! Events that need a system before one is known (tailing can start
//! mid-file) are buffered and replayed once the first arrival event lands;
//! scans carrying their own system context are persisted immediately.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::commander::CommanderState;
use crate::error::Result;
use crate::events::{CompanionEvent, EventBus};
use crate::journal::{
    BodySignals, EventKind, JournalEvent, JumpInfo, OrganicScan, ScanInfo, SystemArrival,
};
use crate::store::{BodyPatch, JumpRecord, SessionId, Store, SystemId, SystemPatch};
use crate::value;

/// Upper bound on events buffered while no system is known.
const PENDING_CAP: usize = 256;

#[derive(Debug, Clone)]
struct CurrentSystem {
    id: SystemId,
    name: String,
}

/// Per-body context that only matters while the commander stays in the
/// system; cleared on every arrival.
#[derive(Debug, Default)]
struct SystemContext {
    /// Last scan per body index, kept so a later mapping can re-estimate.
    scans: HashMap<i64, ScanInfo>,
    /// Body indexes this commander has surface-mapped here.
    mapped: HashMap<i64, ()>,
    /// Genus lists the surface survey predicted, per body index.
    expected_genuses: HashMap<i64, Vec<String>>,
}

/// Orders journal events into persistent state and outward events.
pub struct SessionTracker {
    store: Arc<Store>,
    bus: EventBus,
    session: Option<SessionId>,
    current: Option<CurrentSystem>,
    context: SystemContext,
    commander: CommanderState,
    pending: Vec<JournalEvent>,
}

impl SessionTracker {
    /// Create a tracker writing to `store` and publishing on `bus`.
    #[must_use]
    pub fn new(store: Arc<Store>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            session: None,
            current: None,
            context: SystemContext::default(),
            commander: CommanderState::default(),
            pending: Vec::new(),
        }
    }

    /// The system the commander is currently in, when known.
    #[must_use]
    pub fn current_system(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.name.as_str())
    }

    /// The open session, if any.
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Current commander snapshot.
    #[must_use]
    pub fn commander(&self) -> &CommanderState {
        &self.commander
    }

    /// Drop all in-memory context (backfill start). The store is untouched.
    pub fn reset(&mut self) {
        self.session = None;
        self.current = None;
        self.context = SystemContext::default();
        self.commander.reset();
        self.pending.clear();
    }

    /// Close the open session, if any, at `at` (end of a replayed stream
    /// whose final file never wrote a Shutdown).
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn close_open_session(&mut self, at: DateTime<Utc>) -> Result<()> {
        if let Some(session) = self.session.take() {
            self.store.close_session(session, at)?;
        }
        Ok(())
    }

    /// Apply one decoded event.
    ///
    /// # Errors
    ///
    /// Returns store errors; the caller decides whether to abort the stream.
    pub fn apply(&mut self, event: JournalEvent) -> Result<()> {
        let at = event.timestamp;
        match event.kind {
            EventKind::Location(arrival) => {
                self.enter_system(&arrival, at, None)?;
                self.bus.emit(CompanionEvent::SystemChanged {
                    system: arrival.system,
                });
            }
            EventKind::FsdJump(jump) => {
                let arrival = SystemArrival {
                    system: jump.system.clone(),
                    pos: jump.pos,
                };
                self.enter_system(&arrival, at, Some(&jump))?;
                self.bus.emit(CompanionEvent::SystemChanged {
                    system: jump.system,
                });
            }
            EventKind::CarrierJump(arrival) => {
                self.enter_system(&arrival, at, None)?;
                self.bus.emit(CompanionEvent::CarrierJumped {
                    system: arrival.system,
                });
            }
            EventKind::DiscoveryScan { system, body_count } => {
                let name = system.or_else(|| self.current_system().map(str::to_owned));
                if let Some(name) = name {
                    self.store.upsert_system(&SystemPatch {
                        name,
                        body_count: Some(body_count),
                        ..SystemPatch::default()
                    })?;
                }
            }
            EventKind::Scan(scan) => self.handle_scan(scan, at)?,
            EventKind::MappingComplete {
                body_name, body_id, ..
            } => self.handle_mapping(body_name, body_id, at)?,
            EventKind::BodySignals(signals) => self.handle_signals(signals, at)?,
            EventKind::AllBodiesFound { system, count } => {
                self.store.upsert_system(&SystemPatch {
                    name: system.clone(),
                    body_count: Some(count),
                    ..SystemPatch::default()
                })?;
                self.bus
                    .emit(CompanionEvent::AllBodiesFound { system, count });
            }
            EventKind::OrganicScan(scan) => self.handle_organic(scan, at)?,
            EventKind::Codex(entry) => self.store.insert_codex(&entry, at)?,
            EventKind::GameStart(start) => {
                if let Some(open) = self.session.take() {
                    // Crash or ungraceful quit never wrote a Shutdown.
                    warn!(session = %open, "session left open, closing at next start");
                    self.store.close_session(open, at)?;
                }
                self.session = Some(self.store.open_session(at)?);
                self.commander.apply_game_start(&start);
                self.bus.emit(CompanionEvent::GameStarted { at });
                self.emit_commander();
            }
            EventKind::CommanderName { name } => {
                self.commander.name = Some(name);
                self.emit_commander();
            }
            EventKind::Shutdown => {
                if let Some(session) = self.session.take() {
                    self.store.close_session(session, at)?;
                }
                self.bus.emit(CompanionEvent::GameStopped { at });
            }
            EventKind::Continued { part } => {
                self.bus.emit(CompanionEvent::Continued { part });
            }
            EventKind::Rank(update) => {
                self.commander.apply_rank(&update);
                self.emit_commander();
            }
            EventKind::Progress(update) => {
                self.commander.apply_progress(&update);
                self.emit_commander();
            }
            EventKind::Reputation(update) => {
                self.commander.apply_reputation(&update);
                self.emit_commander();
            }
            EventKind::Powerplay(update) => {
                self.commander.apply_powerplay(&update);
                self.emit_commander();
            }
            EventKind::Touchdown(contact) => self.bus.emit(CompanionEvent::Touchdown(contact)),
            EventKind::Liftoff(contact) => self.bus.emit(CompanionEvent::Liftoff(contact)),
            EventKind::Footfall(contact) => {
                self.bus.emit(CompanionEvent::BodyFootfalled(contact));
            }
            EventKind::RoutePlotted => self.bus.emit(CompanionEvent::RoutePlotted),
            EventKind::RouteCleared => self.bus.emit(CompanionEvent::RouteCleared),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // System arrival
    // ------------------------------------------------------------------

    fn enter_system(
        &mut self,
        arrival: &SystemArrival,
        at: DateTime<Utc>,
        jump: Option<&JumpInfo>,
    ) -> Result<()> {
        let origin = self.current_system().map(str::to_owned);
        let same_system = origin
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case(&arrival.system));

        let id = self.store.upsert_system(&SystemPatch {
            name: arrival.system.clone(),
            pos: arrival.pos,
            visited_at: Some(at),
            ..SystemPatch::default()
        })?;

        if let Some(jump) = jump {
            self.store.record_jump(&JumpRecord {
                session_id: self.session,
                origin,
                destination: jump.system.clone(),
                distance_ly: jump.distance_ly,
                fuel_used: jump.fuel_used,
                at,
            })?;
        }

        self.current = Some(CurrentSystem {
            id,
            name: arrival.system.clone(),
        });
        if !same_system {
            self.context = SystemContext::default();
        }
        debug!(system = %arrival.system, "entered system");

        self.flush_pending()?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let buffered = std::mem::take(&mut self.pending);
        debug!(count = buffered.len(), "replaying buffered events");
        for event in buffered {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Buffer an event until a system is known. The cap bounds memory when a
    /// stream never names a system; oldest events go first.
    fn buffer(&mut self, event: JournalEvent) {
        if self.pending.len() >= PENDING_CAP {
            self.pending.remove(0);
            warn!("pending event buffer full, dropping oldest");
        }
        self.pending.push(event);
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Resolve the system a scan belongs to. Scans carry their own system
    /// name, so they can be persisted even before any arrival event.
    fn scan_system(&mut self, scan: &ScanInfo) -> Result<Option<(SystemId, String)>> {
        if let Some(current) = &self.current {
            let matches = scan
                .system
                .as_deref()
                .is_none_or(|s| s.eq_ignore_ascii_case(&current.name));
            if matches {
                return Ok(Some((current.id, current.name.clone())));
            }
        }
        match &scan.system {
            Some(name) => {
                // Not a visit: no visited_at.
                let id = self.store.upsert_system(&SystemPatch {
                    name: name.clone(),
                    ..SystemPatch::default()
                })?;
                Ok(Some((id, name.clone())))
            }
            None => Ok(None),
        }
    }

    fn handle_scan(&mut self, scan: ScanInfo, at: DateTime<Utc>) -> Result<()> {
        let Some((system_id, system_name)) = self.scan_system(&scan)? else {
            self.buffer(JournalEvent {
                timestamp: at,
                kind: EventKind::Scan(scan),
            });
            return Ok(());
        };

        let in_current = self
            .current
            .as_ref()
            .is_some_and(|c| c.id == system_id);
        let mapped = in_current && self.context.mapped.contains_key(&scan.body_id);
        let estimate = value::estimate(&scan, mapped);

        self.store
            .upsert_body(system_id, &body_patch(&scan, estimate, at))?;

        if scan.is_primary_star() {
            if let Some(class) = &scan.star_class {
                self.store.upsert_system(&SystemPatch {
                    name: system_name.clone(),
                    primary_star_class: Some(class.clone()),
                    ..SystemPatch::default()
                })?;
            }
        }

        if in_current {
            self.context.scans.insert(scan.body_id, scan.clone());
        }
        self.bus.emit(CompanionEvent::BodyScanned {
            system: system_name,
            body_name: scan.body_name,
        });
        Ok(())
    }

    fn handle_mapping(&mut self, body_name: String, body_id: i64, at: DateTime<Utc>) -> Result<()> {
        let Some(current) = &self.current else {
            self.buffer(JournalEvent {
                timestamp: at,
                kind: EventKind::MappingComplete {
                    body_name,
                    body_id,
                    probes_used: None,
                    efficiency_target: None,
                },
            });
            return Ok(());
        };
        let system_id = current.id;
        self.context.mapped.insert(body_id, ());

        // With the scan on hand, mapping lifts the earned value to the
        // body's maximum; without it the flag alone is recorded and the
        // next scan replay fills the value in.
        let values = self.context.scans.get(&body_id).map(|scan| {
            let estimate = value::estimate(scan, true);
            (estimate.current, estimate.max)
        });
        self.store.upsert_body(
            system_id,
            &BodyPatch {
                body_id,
                name: Some(body_name.clone()),
                mapped: Some(true),
                current_value: values.map(|(current, _)| current),
                max_value: values.map(|(_, max)| max),
                ..BodyPatch::default()
            },
        )?;
        self.bus.emit(CompanionEvent::BodyMapped { body_name });
        Ok(())
    }

    fn handle_signals(&mut self, signals: BodySignals, at: DateTime<Utc>) -> Result<()> {
        let Some(current) = &self.current else {
            self.buffer(JournalEvent {
                timestamp: at,
                kind: EventKind::BodySignals(signals),
            });
            return Ok(());
        };
        let system_id = current.id;

        if !signals.genuses.is_empty() {
            self.context
                .expected_genuses
                .insert(signals.body_id, signals.genuses.clone());
        }

        self.store.upsert_body(
            system_id,
            &BodyPatch {
                body_id: signals.body_id,
                name: Some(signals.body_name.clone()),
                ..BodyPatch::default()
            },
        )?;
        self.bus.emit(CompanionEvent::BodySignalsUpdated(signals));
        Ok(())
    }

    fn handle_organic(&mut self, scan: OrganicScan, at: DateTime<Utc>) -> Result<()> {
        let Some(current) = &self.current else {
            self.buffer(JournalEvent {
                timestamp: at,
                kind: EventKind::OrganicScan(scan),
            });
            return Ok(());
        };
        let system_id = current.id;

        let body = self.store.upsert_body(
            system_id,
            &BodyPatch {
                body_id: scan.body_id,
                ..BodyPatch::default()
            },
        )?;
        self.store.upsert_bio(
            body,
            Some(&scan.genus),
            &scan.species,
            scan.stage as u8,
            0,
            false,
            at,
        )?;

        if let Some(expected) = self.context.expected_genuses.get(&scan.body_id) {
            if !expected.iter().any(|g| g.eq_ignore_ascii_case(&scan.genus)) {
                self.bus.emit(CompanionEvent::ExobiologyMismatch {
                    body_id: scan.body_id,
                    genus: scan.genus.clone(),
                });
            }
        }

        self.bus.emit(CompanionEvent::BioScanned {
            species: scan.species,
            stage: scan.stage as u8,
        });
        Ok(())
    }

    fn emit_commander(&self) {
        self.bus
            .emit(CompanionEvent::CommanderUpdated(self.commander.clone()));
    }
}

fn body_patch(scan: &ScanInfo, estimate: value::BodyValue, at: DateTime<Utc>) -> BodyPatch {
    BodyPatch {
        body_id: scan.body_id,
        name: Some(scan.body_name.clone()),
        body_type: Some(if scan.star_class.is_some() { "Star" } else { "Planet" }.to_string()),
        sub_class: scan.star_class.clone().or_else(|| scan.planet_class.clone()),
        terraform_state: scan.terraform_state.clone(),
        distance_ls: scan.distance_ls,
        landable: Some(scan.landable),
        mass: scan.mass,
        radius: scan.radius,
        surface_gravity: scan.surface_gravity,
        was_discovered: scan.was_discovered,
        was_mapped: scan.was_mapped,
        scanned: Some(true),
        mapped: None,
        current_value: Some(estimate.current),
        max_value: Some(estimate.max),
        scanned_at: Some(at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{ParseOutcome, parse_line};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn tracker() -> (SessionTracker, UnboundedReceiver<CompanionEvent>) {
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let (bus, rx) = EventBus::channel();
        (SessionTracker::new(store, bus), rx)
    }

    fn feed(tracker: &mut SessionTracker, line: &str) {
        let ParseOutcome::Event(event) = parse_line(line) else {
            panic!("line did not parse: {line}");
        };
        tracker.apply(event).expect("apply");
    }

    fn drain(rx: &mut UnboundedReceiver<CompanionEvent>) -> Vec<CompanionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn jump_records_route_and_announces_system() {
        let (mut tracker, mut rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"LoadGame","Commander":"Jameson","Credits":100}"#,
        );
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:01:00Z","event":"FSDJump","StarSystem":"Maia","JumpDist":9.2,"FuelUsed":1.1}"#,
        );

        assert_eq!(tracker.current_system(), Some("Maia"));
        let store = tracker.store.clone();
        let page = store
            .route_page(&crate::store::query::RouteFilter::default())
            .expect("page");
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].destination, "Maia");

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, CompanionEvent::SystemChanged { system } if system == "Maia")));
    }

    #[test]
    fn scan_before_arrival_uses_own_system_context() {
        let (mut tracker, _rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:05Z","event":"Scan","ScanType":"AutoScan",
                "BodyName":"Maia A 1","BodyID":1,"StarSystem":"Maia",
                "PlanetClass":"Metal rich body","MassEM":0.4,"DistanceFromArrivalLS":120.0}"#,
        );

        let store = tracker.store.clone();
        let system = store.system_by_name("Maia").expect("query").expect("row");
        assert!(system.first_visited.is_none(), "a scan is not a visit");
        let bodies = store.bodies_for_system(system.id).expect("bodies");
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].scanned);
        assert!(bodies[0].current_value > 0);
    }

    #[test]
    fn body_events_without_system_are_replayed_on_arrival() {
        let (mut tracker, mut rx) = tracker();
        // No system context at all yet; must be buffered, not lost.
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"SAAScanComplete","BodyName":"Maia A 1","BodyID":1}"#,
        );
        let store = tracker.store.clone();
        assert_eq!(store.stats().expect("stats").bodies, 0);

        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:30Z","event":"Location","StarSystem":"Maia"}"#,
        );
        assert_eq!(store.stats().expect("stats").bodies, 1);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, CompanionEvent::BodyMapped { .. })));
    }

    #[test]
    fn mapping_after_scan_lifts_value_to_max() {
        let (mut tracker, _rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Location","StarSystem":"Maia"}"#,
        );
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:01:00Z","event":"Scan","ScanType":"Detailed",
                "BodyName":"Maia A 1","BodyID":1,"StarSystem":"Maia",
                "PlanetClass":"Water world","MassEM":0.8,"WasDiscovered":true}"#,
        );
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:02:00Z","event":"SAAScanComplete","BodyName":"Maia A 1","BodyID":1}"#,
        );

        let store = tracker.store.clone();
        let system = store.system_by_name("Maia").expect("query").expect("row");
        let bodies = store.bodies_for_system(system.id).expect("bodies");
        assert!(bodies[0].mapped);
        assert_eq!(bodies[0].current_value, bodies[0].max_value);
    }

    #[test]
    fn unexpected_genus_raises_mismatch() {
        let (mut tracker, mut rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Location","StarSystem":"Maia"}"#,
        );
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:01:00Z","event":"SAASignalsFound",
                "BodyName":"Maia A 1","BodyID":1,
                "Signals":[{"Type_Localised":"Biological","Count":1}],
                "Genuses":[{"Genus_Localised":"Bacterium"}]}"#,
        );
        drain(&mut rx);

        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:05:00Z","event":"ScanOrganic","ScanType":"Log",
                "Genus_Localised":"Stratum","Species_Localised":"Stratum Paleas","Body":1}"#,
        );
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            CompanionEvent::ExobiologyMismatch { genus, .. } if genus == "Stratum"
        )));
    }

    #[test]
    fn predicted_genus_does_not_mismatch() {
        let (mut tracker, mut rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Location","StarSystem":"Maia"}"#,
        );
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:01:00Z","event":"SAASignalsFound",
                "BodyName":"Maia A 1","BodyID":1,"Signals":[],
                "Genuses":[{"Genus_Localised":"Stratum"}]}"#,
        );
        drain(&mut rx);
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:05:00Z","event":"ScanOrganic","ScanType":"Analyse",
                "Genus_Localised":"Stratum","Species_Localised":"Stratum Paleas","Body":1}"#,
        );
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, CompanionEvent::ExobiologyMismatch { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, CompanionEvent::BioScanned { stage: 3, .. })));
    }

    #[test]
    fn second_load_game_closes_dangling_session() {
        let (mut tracker, _rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"LoadGame","Commander":"Jameson"}"#,
        );
        let first = tracker.session().expect("open");
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T15:00:00Z","event":"LoadGame","Commander":"Jameson"}"#,
        );
        let second = tracker.session().expect("open");
        assert_ne!(first, second);

        let store = tracker.store.clone();
        let sessions = store.session_summaries().expect("sessions");
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].ended_at.is_some(), "first session closed");
        assert!(sessions[1].ended_at.is_none());
    }

    #[test]
    fn shutdown_closes_session_and_announces() {
        let (mut tracker, mut rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"LoadGame","Commander":"Jameson"}"#,
        );
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T14:00:00Z","event":"Shutdown"}"#,
        );
        assert!(tracker.session().is_none());
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, CompanionEvent::GameStopped { .. })));
    }

    #[test]
    fn primary_star_sets_system_class() {
        let (mut tracker, _rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Scan","ScanType":"AutoScan",
                "BodyName":"Maia","BodyID":0,"StarSystem":"Maia","StarType":"B",
                "DistanceFromArrivalLS":0.0,"StellarMass":5.0}"#,
        );
        let store = tracker.store.clone();
        let system = store.system_by_name("Maia").expect("query").expect("row");
        assert_eq!(system.primary_star_class.as_deref(), Some("B"));
    }

    #[test]
    fn reset_clears_context_but_not_store() {
        let (mut tracker, _rx) = tracker();
        feed(
            &mut tracker,
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"Location","StarSystem":"Maia"}"#,
        );
        tracker.reset();
        assert!(tracker.current_system().is_none());
        let store = tracker.store.clone();
        assert_eq!(store.stats().expect("stats").systems, 1);
    }
}
