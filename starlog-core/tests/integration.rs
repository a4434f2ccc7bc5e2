//! End-to-end tests over the public API: journal files on disk, through
//! backfill, into the store, out through queries.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use starlog_core::store::query::RouteFilter;
use starlog_core::{Backfill, CancelToken, EventBus, IngestGate, StarlogConfig, Store};

fn write_journal(dir: &Path, name: &str, lines: &[&str]) {
    let mut file = File::create(dir.join(name)).expect("create journal");
    for line in lines {
        writeln!(file, "{line}").expect("write line");
    }
}

fn backfill_runner(store: &Arc<Store>) -> Backfill {
    Backfill::new(
        Arc::clone(store),
        EventBus::disconnected(),
        Arc::new(IngestGate::default()),
    )
}

/// Two sessions of play: jumps, scans, mapping, exobiology, codex.
fn seed_corpus(dir: &Path) {
    write_journal(
        dir,
        "Journal.2024-06-01T120000.01.log",
        &[
            r#"{"timestamp":"2024-06-01T12:00:00Z","event":"LoadGame","Commander":"Jameson","Ship":"Asp Explorer","Credits":1000000,"Loan":0}"#,
            r#"{"timestamp":"2024-06-01T12:00:10Z","event":"Location","StarSystem":"Sol","StarPos":[0.0,0.0,0.0]}"#,
            r#"{"timestamp":"2024-06-01T12:05:00Z","event":"FSDJump","StarSystem":"Maia","StarPos":[-81.78,-149.44,-343.38],"JumpDist":9.2,"FuelUsed":1.1}"#,
            r#"{"timestamp":"2024-06-01T12:05:30Z","event":"FSSDiscoveryScan","SystemName":"Maia","BodyCount":8}"#,
            r#"{"timestamp":"2024-06-01T12:06:00Z","event":"Scan","ScanType":"AutoScan","BodyName":"Maia","BodyID":0,"StarSystem":"Maia","StarType":"B","StellarMass":5.1,"DistanceFromArrivalLS":0.0,"WasDiscovered":true}"#,
            r#"{"timestamp":"2024-06-01T12:07:00Z","event":"Scan","ScanType":"Detailed","BodyName":"Maia A 1","BodyID":1,"StarSystem":"Maia","PlanetClass":"Water world","MassEM":0.82,"DistanceFromArrivalLS":451.2,"Landable":false,"WasDiscovered":false,"WasMapped":false}"#,
            r#"{"timestamp":"2024-06-01T12:09:00Z","event":"SAAScanComplete","BodyName":"Maia A 1","BodyID":1,"ProbesUsed":6,"EfficiencyTarget":7}"#,
            r#"{"timestamp":"2024-06-01T12:10:00Z","event":"SAASignalsFound","BodyName":"Maia A 2","BodyID":2,"Signals":[{"Type_Localised":"Biological","Count":2}],"Genuses":[{"Genus_Localised":"Bacterium"},{"Genus_Localised":"Stratum"}]}"#,
            r#"{"timestamp":"2024-06-01T12:30:00Z","event":"Shutdown"}"#,
        ],
    );
    write_journal(
        dir,
        "Journal.2024-06-02T090000.01.log",
        &[
            r#"{"timestamp":"2024-06-02T09:00:00Z","event":"LoadGame","Commander":"Jameson","Credits":1150000}"#,
            r#"{"timestamp":"2024-06-02T09:00:05Z","event":"Location","StarSystem":"Maia"}"#,
            r#"{"timestamp":"2024-06-02T09:10:00Z","event":"ScanOrganic","ScanType":"Log","Genus_Localised":"Stratum","Species_Localised":"Stratum Paleas","Body":2}"#,
            r#"{"timestamp":"2024-06-02T09:20:00Z","event":"ScanOrganic","ScanType":"Sample","Genus_Localised":"Stratum","Species_Localised":"Stratum Paleas","Body":2}"#,
            r#"{"timestamp":"2024-06-02T09:30:00Z","event":"ScanOrganic","ScanType":"Analyse","Genus_Localised":"Stratum","Species_Localised":"Stratum Paleas","Body":2}"#,
            r#"{"timestamp":"2024-06-02T09:31:00Z","event":"CodexEntry","Name_Localised":"Stratum Paleas","Category_Localised":"Biology","SubCategory_Localised":"Organic structures","Region_Localised":"Inner Orion Spur","IsNewEntry":true,"VoucherAmount":2500}"#,
            r#"{"timestamp":"2024-06-02T09:45:00Z","event":"FSDJump","StarSystem":"Merope","JumpDist":4.8,"FuelUsed":0.7}"#,
            r#"{"timestamp":"2024-06-02T10:00:00Z","event":"Shutdown"}"#,
        ],
    );
}

#[test]
fn backfill_builds_complete_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_corpus(dir.path());

    let store = Arc::new(Store::open_in_memory().expect("store"));
    let report = backfill_runner(&store)
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("backfill");
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.malformed_lines, 0);

    let stats = store.stats().expect("stats");
    assert_eq!(stats.systems, 3, "Sol, Maia, Merope");
    assert_eq!(stats.jumps, 2);
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.codex_entries, 1);

    // Maia accumulated everything across both sessions.
    let maia = store.system_by_name("Maia").expect("query").expect("row");
    assert_eq!(maia.primary_star_class.as_deref(), Some("B"));
    assert_eq!(maia.body_count, 8);
    assert!(maia.first_visited.is_some());
    assert!(maia.scan_value > 0);

    let bodies = store.bodies_for_system(maia.id).expect("bodies");
    assert_eq!(bodies.len(), 3, "star, water world, bio body");

    let water_world = bodies
        .iter()
        .find(|b| b.body_id == 1)
        .expect("water world");
    assert!(water_world.scanned);
    assert!(water_world.mapped);
    assert_eq!(
        water_world.current_value, water_world.max_value,
        "mapped body earns its maximum"
    );

    let bio_body = bodies.iter().find(|b| b.body_id == 2).expect("bio body");
    let detections = store.bio_for_body(bio_body.key).expect("bio");
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].scan_stage, 3, "Log, Sample, Analyse collapse");
    assert_eq!(detections[0].genus.as_deref(), Some("Stratum"));
}

#[test]
fn replaying_history_changes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_corpus(dir.path());

    let store = Arc::new(Store::open_in_memory().expect("store"));
    let runner = backfill_runner(&store);
    runner
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("first run");

    let before = store.stats().expect("stats");
    let maia_before = store.system_by_name("Maia").expect("query").expect("row");

    runner
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("second run");

    let after = store.stats().expect("stats");
    assert_eq!(before.systems, after.systems);
    assert_eq!(before.bodies, after.bodies);
    assert_eq!(before.bio_detections, after.bio_detections);
    // Route history and sessions are append-only records of real play, so
    // replaying the files legitimately appends; derived state must not move.
    let maia_after = store.system_by_name("Maia").expect("query").expect("row");
    assert_eq!(maia_before.first_visited, maia_after.first_visited);
    assert_eq!(maia_before.scan_value, maia_after.scan_value);
    assert_eq!(maia_before.body_count, maia_after.body_count);
}

#[test]
fn route_history_filters_and_paginates() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_corpus(dir.path());

    let store = Arc::new(Store::open_in_memory().expect("store"));
    backfill_runner(&store)
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("backfill");

    let all = store.route_page(&RouteFilter::default()).expect("page");
    assert_eq!(all.total, 2);
    assert_eq!(all.entries[0].destination, "Merope", "newest first");

    let filtered = store
        .route_page(&RouteFilter {
            text: Some("maia".to_string()),
            ..RouteFilter::default()
        })
        .expect("page");
    assert_eq!(filtered.total, 1);
    // The snapshot captured Maia before any scans landed.
    assert_eq!(filtered.entries[0].scan_value, 0);

    let sessions = store.session_summaries().expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].jump_count, 1);
    assert_eq!(sessions[1].jump_count, 1);
    assert_eq!(sessions[1].codex_logged, 1);
}

#[test]
fn backup_and_import_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_corpus(dir.path());

    let live_config = StarlogConfig::from_toml(&format!(
        "[store]\ndb_path = \"{}\"",
        dir.path().join("live.db").display()
    ))
    .expect("config");
    let store = Arc::new(Store::open(&live_config.store).expect("store"));
    backfill_runner(&store)
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("backfill");
    let expected = store.stats().expect("stats");

    let backup_path = dir.path().join("snapshot.db");
    let outcome = store.backup(&backup_path);
    assert!(outcome.success, "{:?}", outcome.error);

    // A fresh, empty store adopts the snapshot wholesale.
    let fresh_config = StarlogConfig::from_toml(&format!(
        "[store]\ndb_path = \"{}\"",
        dir.path().join("fresh.db").display()
    ))
    .expect("config");
    let fresh = Store::open(&fresh_config.store).expect("fresh store");
    let outcome = fresh.import(&backup_path);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(fresh.stats().expect("stats"), expected);
    assert!(fresh.system_by_name("Maia").expect("query").is_some());
}

#[test]
fn failed_import_leaves_store_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_corpus(dir.path());

    let config = StarlogConfig::from_toml(&format!(
        "[store]\ndb_path = \"{}\"",
        dir.path().join("live.db").display()
    ))
    .expect("config");
    let store = Arc::new(Store::open(&config.store).expect("store"));
    backfill_runner(&store)
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("backfill");
    let before = store.stats().expect("stats");

    let garbage = dir.path().join("garbage.db");
    std::fs::write(&garbage, b"not a database at all").expect("write");
    let outcome = store.import(&garbage);
    assert!(!outcome.success);

    // Store still open, still serving the same data.
    assert_eq!(store.stats().expect("stats"), before);
}

#[test]
fn cancelled_backfill_keeps_partial_progress() {
    let dir = tempfile::tempdir().expect("tempdir");
    for day in 10..=19 {
        write_journal(
            dir.path(),
            &format!("Journal.2024-06-{day}T120000.01.log"),
            &[&format!(
                r#"{{"timestamp":"2024-06-{day}T12:00:00Z","event":"FSDJump","StarSystem":"Waypoint {day}","JumpDist":20.0,"FuelUsed":2.0}}"#
            )],
        );
    }

    let store = Arc::new(Store::open_in_memory().expect("store"));
    let cancel = CancelToken::new();
    let report = backfill_runner(&store)
        .run(dir.path(), &cancel, |done, _, _| {
            if done == 4 {
                cancel.cancel();
            }
        })
        .expect("backfill");

    assert!(report.cancelled);
    assert_eq!(report.files_processed, 4);
    assert_eq!(report.total_files, 10);
    assert_eq!(store.stats().expect("stats").jumps, 4);
}

#[test]
fn empty_directory_is_a_report_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let report = backfill_runner(&store)
        .run(dir.path(), &CancelToken::new(), |_, _, _| {})
        .expect("backfill");
    assert_eq!(report.total_files, 0);
    assert!(report.error.is_some());
    assert_eq!(store.stats().expect("stats").systems, 0);
}
