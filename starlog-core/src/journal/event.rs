//! Typed domain events decoded from journal lines.
//!
//! Field layout follows the game's journal wire format; names are normalized
//! to Rust conventions and localized variants are preferred where present.

use chrono::{DateTime, Utc};

/// One decoded journal event: wall-clock timestamp plus typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEvent {
    /// When the game wrote the line.
    pub timestamp: DateTime<Utc>,
    /// The typed payload.
    pub kind: EventKind,
}

/// Every journal event kind the engine understands.
///
/// Unknown kinds never reach this enum; the parser reports them as
/// unrecognized so new game versions degrade gracefully.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Arrival in a system without a hyperspace jump (login, relog).
    Location(SystemArrival),
    /// Hyperspace jump into a new system.
    FsdJump(JumpInfo),
    /// Fleet-carrier jump while aboard.
    CarrierJump(SystemArrival),
    /// Discovery scanner "honk": reveals the system body count.
    DiscoveryScan {
        /// System the honk was fired in, when the journal includes it.
        system: Option<String>,
        /// Total bodies in the system.
        body_count: u32,
    },
    /// Detailed or auto scan of a single body.
    Scan(ScanInfo),
    /// Surface-mapping probe sequence completed for a body.
    MappingComplete {
        /// Journal body name.
        body_name: String,
        /// Body index within the system.
        body_id: i64,
        /// Probes fired.
        probes_used: Option<u32>,
        /// Probe-efficiency target for the bonus.
        efficiency_target: Option<u32>,
    },
    /// Signal counts (biological, geological, ...) detected on a body.
    BodySignals(BodySignals),
    /// Every body in the system has been discovered.
    AllBodiesFound {
        /// System name.
        system: String,
        /// Number of bodies.
        count: u32,
    },
    /// One stage of an organic (exobiology) scan.
    OrganicScan(OrganicScan),
    /// A discovery catalogue entry was logged.
    Codex(CodexObservation),
    /// Play session started.
    GameStart(GameStart),
    /// Commander identity confirmed.
    CommanderName {
        /// Commander name.
        name: String,
    },
    /// Clean game shutdown.
    Shutdown,
    /// The journal rolled over to a new part file mid-session.
    Continued {
        /// Part number of the next file.
        part: u32,
    },
    /// Absolute rank values per category.
    Rank(RankUpdate),
    /// Progress (percent) towards the next rank per category.
    Progress(RankUpdate),
    /// Faction reputation snapshot (-100..100 per axis).
    Reputation(ReputationUpdate),
    /// Powerplay pledge standing.
    Powerplay(PowerplayUpdate),
    /// Ship touched down on a surface.
    Touchdown(SurfaceContact),
    /// Ship lifted off a surface.
    Liftoff(SurfaceContact),
    /// Commander set foot on a body.
    Footfall(SurfaceContact),
    /// A navigation route was plotted.
    RoutePlotted,
    /// The navigation route was cleared.
    RouteCleared,
}

/// System arrival payload shared by Location and CarrierJump.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemArrival {
    /// System name.
    pub system: String,
    /// Galactic coordinates, when present.
    pub pos: Option<[f64; 3]>,
}

/// Hyperspace jump payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JumpInfo {
    /// Destination system name.
    pub system: String,
    /// Galactic coordinates of the destination.
    pub pos: Option<[f64; 3]>,
    /// Jump distance in light years.
    pub distance_ly: f64,
    /// Fuel spent on the jump, in tons.
    pub fuel_used: f64,
}

/// Body scan payload. Star and planet fields are mutually exclusive in
/// practice but both optional here; absent fields leave stored values alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanInfo {
    /// Full journal body name.
    pub body_name: String,
    /// Body index within the system.
    pub body_id: i64,
    /// System the body belongs to (scans carry their own system context).
    pub system: Option<String>,
    /// AutoScan, Basic, Detailed, or NavBeaconDetail.
    pub scan_type: String,
    /// Star class (stars only).
    pub star_class: Option<String>,
    /// Planet class (planets only).
    pub planet_class: Option<String>,
    /// Terraforming state, if any.
    pub terraform_state: Option<String>,
    /// Distance from arrival in light seconds.
    pub distance_ls: Option<f64>,
    /// Whether the body can be landed on.
    pub landable: bool,
    /// Mass in earth masses (planets) or solar masses (stars).
    pub mass: Option<f64>,
    /// Radius in meters.
    pub radius: Option<f64>,
    /// Surface gravity in m/s².
    pub surface_gravity: Option<f64>,
    /// Someone discovered this body before us.
    pub was_discovered: Option<bool>,
    /// Someone mapped this body before us.
    pub was_mapped: Option<bool>,
}

impl ScanInfo {
    /// Whether this scan describes the system's primary star.
    #[must_use]
    pub fn is_primary_star(&self) -> bool {
        self.star_class.is_some() && self.distance_ls.unwrap_or(f64::MAX) < f64::EPSILON
    }
}

/// One signal type and its count on a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalCount {
    /// Localized signal kind (Biological, Geological, ...).
    pub kind: String,
    /// Number of signals of this kind.
    pub count: u32,
}

/// Signals detected on a body, with the organism genus list when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySignals {
    /// Journal body name.
    pub body_name: String,
    /// Body index within the system.
    pub body_id: i64,
    /// Signal counts per kind.
    pub signals: Vec<SignalCount>,
    /// Genus names expected on the body (surface scans only).
    pub genuses: Vec<String>,
}

/// Stage of an organic scan. The game requires three samples per species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrganicStage {
    /// First sample logged.
    Log = 1,
    /// Second sample taken.
    Sample = 2,
    /// Third sample: analysis complete, voucher awarded.
    Analyse = 3,
}

impl OrganicStage {
    /// Decode the journal's `ScanType` string.
    #[must_use]
    pub fn from_scan_type(s: &str) -> Option<Self> {
        match s {
            "Log" => Some(Self::Log),
            "Sample" => Some(Self::Sample),
            "Analyse" => Some(Self::Analyse),
            _ => None,
        }
    }
}

/// One stage of scanning an organism on a body.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganicScan {
    /// Scan stage reached.
    pub stage: OrganicStage,
    /// Localized genus name.
    pub genus: String,
    /// Localized species name.
    pub species: String,
    /// Color variant, when the journal provides one.
    pub variant: Option<String>,
    /// Body index the organism lives on.
    pub body_id: i64,
}

/// A codex (discovery catalogue) observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexObservation {
    /// Localized entry name.
    pub name: String,
    /// Top-level category.
    pub category: String,
    /// Subcategory.
    pub sub_category: String,
    /// Galactic region the discovery was made in.
    pub region: String,
    /// Voucher amount in credits.
    pub voucher: i64,
    /// First time this commander logged the entry.
    pub is_new: bool,
}

/// Session-start payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameStart {
    /// Commander name.
    pub commander: Option<String>,
    /// Current ship type.
    pub ship: Option<String>,
    /// Credit balance.
    pub credits: Option<i64>,
    /// Outstanding loan.
    pub loan: Option<i64>,
}

/// Partial rank (or rank-progress) update. Absent categories are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankUpdate {
    /// Combat rank or progress.
    pub combat: Option<u8>,
    /// Trade rank or progress.
    pub trade: Option<u8>,
    /// Exploration rank or progress.
    pub explore: Option<u8>,
    /// Mercenary rank or progress.
    pub soldier: Option<u8>,
    /// Exobiologist rank or progress.
    pub exobiologist: Option<u8>,
    /// Empire navy rank or progress.
    pub empire: Option<u8>,
    /// Federation navy rank or progress.
    pub federation: Option<u8>,
    /// Arena rank or progress.
    pub cqc: Option<u8>,
}

/// Partial faction reputation update. Axes range -100..100.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReputationUpdate {
    /// Empire axis.
    pub empire: Option<f64>,
    /// Federation axis.
    pub federation: Option<f64>,
    /// Alliance axis.
    pub alliance: Option<f64>,
    /// Independent axis.
    pub independent: Option<f64>,
}

/// Powerplay pledge standing.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerplayUpdate {
    /// Pledged power.
    pub power: String,
    /// Rank with that power.
    pub rank: Option<u32>,
    /// Accumulated merits.
    pub merits: Option<i64>,
}

/// Surface contact payload shared by Touchdown, Liftoff, and Footfall.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceContact {
    /// Body name, when the journal includes it.
    pub body: Option<String>,
    /// Latitude of the contact point.
    pub latitude: Option<f64>,
    /// Longitude of the contact point.
    pub longitude: Option<f64>,
}
