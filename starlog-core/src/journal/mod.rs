//! Journal line parser.
//!
//! Turns one raw journal line into zero or one typed [`JournalEvent`].
//! Pure and stateless: unknown event kinds are reported as
//! [`ParseOutcome::Unrecognized`] for forward compatibility, and anything
//! that fails to decode is [`ParseOutcome::Malformed`]; callers count
//! malformed lines, they never abort on them.

pub mod event;

use chrono::{DateTime, Utc};
use serde_json::Value;

pub use event::{
    BodySignals, CodexObservation, EventKind, GameStart, JournalEvent, JumpInfo, OrganicScan,
    OrganicStage, PowerplayUpdate, RankUpdate, ReputationUpdate, ScanInfo, SignalCount,
    SurfaceContact, SystemArrival,
};

/// Result of parsing one journal line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A recognized, fully decoded event.
    Event(JournalEvent),
    /// Valid journal line of a kind the engine does not track.
    Unrecognized,
    /// Not a decodable journal line (bad JSON, missing tag, bad payload).
    Malformed,
}

/// Whether a file name follows the journal naming convention
/// (`Journal.<timestamp>.<part>.log`).
#[must_use]
pub fn is_journal_file(name: &str) -> bool {
    name.starts_with("Journal.") && name.ends_with(".log")
}

/// Parse one journal line.
///
/// Empty and whitespace-only lines are unrecognized, not malformed: the
/// game occasionally pads files and a trailing newline is normal.
#[must_use]
pub fn parse_line(line: &str) -> ParseOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ParseOutcome::Unrecognized;
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return ParseOutcome::Malformed;
    };
    let Some(obj) = value.as_object() else {
        return ParseOutcome::Malformed;
    };

    let Some(timestamp) = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
    else {
        return ParseOutcome::Malformed;
    };
    let Some(kind_tag) = obj.get("event").and_then(Value::as_str) else {
        return ParseOutcome::Malformed;
    };

    let kind = match kind_tag {
        "Location" => get_str(obj, "StarSystem").map(|system| {
            EventKind::Location(SystemArrival {
                system,
                pos: get_pos(obj),
            })
        }),
        "FSDJump" => get_str(obj, "StarSystem").map(|system| {
            EventKind::FsdJump(JumpInfo {
                system,
                pos: get_pos(obj),
                distance_ly: get_f64(obj, "JumpDist").unwrap_or(0.0),
                fuel_used: get_f64(obj, "FuelUsed").unwrap_or(0.0),
            })
        }),
        "CarrierJump" => get_str(obj, "StarSystem").map(|system| {
            EventKind::CarrierJump(SystemArrival {
                system,
                pos: get_pos(obj),
            })
        }),
        "FSSDiscoveryScan" => get_u32(obj, "BodyCount").map(|body_count| {
            EventKind::DiscoveryScan {
                system: get_str(obj, "SystemName"),
                body_count,
            }
        }),
        "Scan" => parse_scan(obj),
        "SAAScanComplete" => match (get_str(obj, "BodyName"), get_i64(obj, "BodyID")) {
            (Some(body_name), Some(body_id)) => Some(EventKind::MappingComplete {
                body_name,
                body_id,
                probes_used: get_u32(obj, "ProbesUsed"),
                efficiency_target: get_u32(obj, "EfficiencyTarget"),
            }),
            _ => None,
        },
        "FSSBodySignals" | "SAASignalsFound" => parse_body_signals(obj),
        "FSSAllBodiesFound" => match (get_str(obj, "SystemName"), get_u32(obj, "Count")) {
            (Some(system), Some(count)) => Some(EventKind::AllBodiesFound { system, count }),
            _ => None,
        },
        "ScanOrganic" => parse_organic(obj),
        "CodexEntry" => parse_codex(obj),
        "LoadGame" => Some(EventKind::GameStart(GameStart {
            commander: get_str(obj, "Commander"),
            ship: localised(obj, "Ship"),
            credits: get_i64(obj, "Credits"),
            loan: get_i64(obj, "Loan"),
        })),
        "Commander" => get_str(obj, "Name").map(|name| EventKind::CommanderName { name }),
        "Shutdown" => Some(EventKind::Shutdown),
        "Continued" => get_u32(obj, "Part").map(|part| EventKind::Continued { part }),
        "Rank" => Some(EventKind::Rank(parse_ranks(obj))),
        "Progress" => Some(EventKind::Progress(parse_ranks(obj))),
        "Reputation" => Some(EventKind::Reputation(ReputationUpdate {
            empire: get_f64(obj, "Empire"),
            federation: get_f64(obj, "Federation"),
            alliance: get_f64(obj, "Alliance"),
            independent: get_f64(obj, "Independent"),
        })),
        "Powerplay" => get_str(obj, "Power").map(|power| {
            EventKind::Powerplay(PowerplayUpdate {
                power,
                rank: get_u32(obj, "Rank"),
                merits: get_i64(obj, "Merits"),
            })
        }),
        "Touchdown" => Some(EventKind::Touchdown(parse_surface_contact(obj))),
        "Liftoff" => Some(EventKind::Liftoff(parse_surface_contact(obj))),
        "Disembark" => {
            if get_bool(obj, "OnPlanet").unwrap_or(false) {
                Some(EventKind::Footfall(parse_surface_contact(obj)))
            } else {
                // Disembarking at a station is not a footfall.
                return ParseOutcome::Unrecognized;
            }
        }
        "NavRoute" => Some(EventKind::RoutePlotted),
        "NavRouteClear" => Some(EventKind::RouteCleared),
        _ => return ParseOutcome::Unrecognized,
    };

    match kind {
        Some(kind) => ParseOutcome::Event(JournalEvent { timestamp, kind }),
        // Recognized tag but required payload fields missing.
        None => ParseOutcome::Malformed,
    }
}

// ---------------------------------------------------------------------------
// Per-kind payload decoding
// ---------------------------------------------------------------------------

fn parse_scan(obj: &serde_json::Map<String, Value>) -> Option<EventKind> {
    let body_name = get_str(obj, "BodyName")?;
    let body_id = get_i64(obj, "BodyID")?;
    Some(EventKind::Scan(ScanInfo {
        body_name,
        body_id,
        system: get_str(obj, "StarSystem"),
        scan_type: get_str(obj, "ScanType").unwrap_or_default(),
        star_class: get_str(obj, "StarType"),
        planet_class: get_str(obj, "PlanetClass"),
        terraform_state: get_str(obj, "TerraformState").filter(|s| !s.is_empty()),
        distance_ls: get_f64(obj, "DistanceFromArrivalLS"),
        landable: get_bool(obj, "Landable").unwrap_or(false),
        mass: get_f64(obj, "MassEM").or_else(|| get_f64(obj, "StellarMass")),
        radius: get_f64(obj, "Radius"),
        surface_gravity: get_f64(obj, "SurfaceGravity"),
        was_discovered: get_bool(obj, "WasDiscovered"),
        was_mapped: get_bool(obj, "WasMapped"),
    }))
}

fn parse_body_signals(obj: &serde_json::Map<String, Value>) -> Option<EventKind> {
    let body_name = get_str(obj, "BodyName")?;
    let body_id = get_i64(obj, "BodyID")?;

    let signals = obj
        .get("Signals")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|s| {
                    let s = s.as_object()?;
                    Some(SignalCount {
                        kind: localised(s, "Type")?,
                        count: get_u32(s, "Count")?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let genuses = obj
        .get("Genuses")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|g| localised(g.as_object()?, "Genus"))
                .collect()
        })
        .unwrap_or_default();

    Some(EventKind::BodySignals(BodySignals {
        body_name,
        body_id,
        signals,
        genuses,
    }))
}

fn parse_organic(obj: &serde_json::Map<String, Value>) -> Option<EventKind> {
    let stage = get_str(obj, "ScanType").and_then(|s| OrganicStage::from_scan_type(&s))?;
    Some(EventKind::OrganicScan(OrganicScan {
        stage,
        genus: localised(obj, "Genus")?,
        species: localised(obj, "Species")?,
        variant: localised(obj, "Variant"),
        body_id: get_i64(obj, "Body")?,
    }))
}

fn parse_codex(obj: &serde_json::Map<String, Value>) -> Option<EventKind> {
    Some(EventKind::Codex(CodexObservation {
        name: localised(obj, "Name")?,
        category: localised(obj, "Category").unwrap_or_default(),
        sub_category: localised(obj, "SubCategory").unwrap_or_default(),
        region: localised(obj, "Region").unwrap_or_default(),
        voucher: get_i64(obj, "VoucherAmount").unwrap_or(0),
        is_new: get_bool(obj, "IsNewEntry").unwrap_or(false),
    }))
}

fn parse_ranks(obj: &serde_json::Map<String, Value>) -> RankUpdate {
    RankUpdate {
        combat: get_u8(obj, "Combat"),
        trade: get_u8(obj, "Trade"),
        explore: get_u8(obj, "Explore"),
        soldier: get_u8(obj, "Soldier"),
        exobiologist: get_u8(obj, "Exobiologist"),
        empire: get_u8(obj, "Empire"),
        federation: get_u8(obj, "Federation"),
        cqc: get_u8(obj, "CQC"),
    }
}

fn parse_surface_contact(obj: &serde_json::Map<String, Value>) -> SurfaceContact {
    SurfaceContact {
        body: get_str(obj, "Body"),
        latitude: get_f64(obj, "Latitude"),
        longitude: get_f64(obj, "Longitude"),
    }
}

// ---------------------------------------------------------------------------
// Field extraction helpers
// ---------------------------------------------------------------------------

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn get_str(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Prefer the `<key>_Localised` variant over the raw symbol name.
fn localised(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    get_str(obj, &format!("{key}_Localised")).or_else(|| get_str(obj, key))
}

fn get_f64(obj: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

fn get_i64(obj: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

fn get_u32(obj: &serde_json::Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn get_u8(obj: &serde_json::Map<String, Value>, key: &str) -> Option<u8> {
    obj.get(key)
        .and_then(Value::as_u64)
        .map(|v| u8::try_from(v.min(u64::from(u8::MAX))).unwrap_or(u8::MAX))
}

fn get_bool(obj: &serde_json::Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

fn get_pos(obj: &serde_json::Map<String, Value>) -> Option<[f64; 3]> {
    let arr = obj.get("StarPos")?.as_array()?;
    match arr.as_slice() {
        [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
        _ => None,
    }
}
