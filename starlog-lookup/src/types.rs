//! Records returned by the remote reference service.
//!
//! Field names follow the service's JSON (camelCase); structs keep only the
//! subset the companion surfaces.

use serde::{Deserialize, Serialize};

/// A known system, as the reference service sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemRecord {
    /// System name.
    pub name: String,
    /// Galactic coordinates, when the service knows them.
    #[serde(default)]
    pub coords: Option<Coords>,
    /// Whether the coordinates are community-confirmed.
    #[serde(default)]
    pub coords_locked: bool,
    /// Primary star summary.
    #[serde(default)]
    pub primary_star: Option<PrimaryStar>,
}

/// Galactic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    /// X axis (ly).
    pub x: f64,
    /// Y axis (ly).
    pub y: f64,
    /// Z axis (ly).
    pub z: f64,
}

/// Primary star summary attached to a system record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryStar {
    /// Star classification.
    #[serde(default)]
    pub r#type: Option<String>,
    /// Star name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the star is scoopable for fuel.
    #[serde(default)]
    pub is_scoopable: bool,
}

/// One body of a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyRecord {
    /// Body name.
    pub name: String,
    /// "Star" or "Planet".
    #[serde(default)]
    pub r#type: Option<String>,
    /// Star or planet sub-classification.
    #[serde(default)]
    pub sub_type: Option<String>,
    /// Distance from arrival in light seconds.
    #[serde(default)]
    pub distance_to_arrival: Option<f64>,
    /// Whether the body can be landed on.
    #[serde(default)]
    pub is_landable: bool,
    /// Terraforming state, if any.
    #[serde(default)]
    pub terraforming_state: Option<String>,
}

/// Response wrapper for the bodies endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodiesResponse {
    /// Total bodies in the system, when the service reports it.
    #[serde(default)]
    pub body_count: Option<u32>,
    /// Bodies on record.
    #[serde(default)]
    pub bodies: Vec<BodyRecord>,
}

/// Exploration valuation of a whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    /// Credits for scanning everything.
    #[serde(default)]
    pub estimated_value: i64,
    /// Credits for scanning and mapping everything.
    #[serde(default)]
    pub estimated_value_mapped: i64,
}

/// One hit from a by-name search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// System name.
    pub name: String,
    /// Galactic coordinates, when known.
    #[serde(default)]
    pub coords: Option<Coords>,
}
