//! Exploration value estimation for scanned bodies.
//!
//! Approximates the in-game payout: a per-class base value scaled by mass,
//! with multipliers for terraformability, surface mapping, and first
//! discovery. Estimates only; the store keeps both the value as currently
//! earned and the maximum attainable for the body.

use crate::journal::ScanInfo;

/// Mass exponent in the payout curve.
const MASS_EXPONENT: f64 = 0.2;
/// Mass coefficient in the payout curve.
const MASS_COEFFICIENT: f64 = 0.565_918;
/// Multiplier once a body has been surface-mapped (with efficiency bonus).
const MAPPED_MULTIPLIER: f64 = 3.333_333;
/// Multiplier for being the first to discover a body.
const FIRST_DISCOVERY_MULTIPLIER: f64 = 2.6;
/// Floor for any scanned body.
const MINIMUM_VALUE: i64 = 500;

/// Value of a body as earned so far plus its maximum attainable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyValue {
    /// Credits earned with the scans performed so far.
    pub current: i64,
    /// Credits attainable with full mapping.
    pub max: i64,
}

/// Estimate a scanned body's value.
///
/// `mapped` reflects whether this commander has mapped the body, which the
/// scan event itself does not know.
#[must_use]
pub fn estimate(scan: &ScanInfo, mapped: bool) -> BodyValue {
    let base = if let Some(star) = scan.star_class.as_deref() {
        star_base_value(star)
    } else {
        planet_base_value(
            scan.planet_class.as_deref().unwrap_or(""),
            scan.terraform_state.is_some(),
        )
    };

    let mass = scan.mass.unwrap_or(1.0).max(0.001);
    let scan_value = base + base * MASS_COEFFICIENT * mass.powf(MASS_EXPONENT);

    // Stars cannot be surface-mapped.
    let mappable = scan.star_class.is_none();
    let mapped_value = if mappable {
        scan_value * MAPPED_MULTIPLIER
    } else {
        scan_value
    };

    let first = scan.was_discovered == Some(false);
    let bonus = if first { FIRST_DISCOVERY_MULTIPLIER } else { 1.0 };

    let current = if mapped { mapped_value } else { scan_value } * bonus;
    let max = mapped_value * bonus;

    BodyValue {
        current: (current as i64).max(MINIMUM_VALUE),
        max: (max as i64).max(MINIMUM_VALUE),
    }
}

fn star_base_value(class: &str) -> f64 {
    match class {
        // Stellar remnants pay out far above main-sequence stars.
        "N" | "H" | "SupermassiveBlackHole" => 22_628.0,
        "D" | "DA" | "DAB" | "DAV" | "DB" | "DBV" | "DC" | "DCV" | "DQ" => 14_057.0,
        _ => 1_200.0,
    }
}

fn planet_base_value(class: &str, terraformable: bool) -> f64 {
    match class {
        "Earthlike body" => 270_000.0,
        "Water world" => {
            if terraformable {
                270_000.0
            } else {
                64_831.0
            }
        }
        "Ammonia world" => 96_932.0,
        "High metal content body" => {
            if terraformable {
                163_948.0
            } else {
                14_057.0
            }
        }
        "Metal rich body" => 31_632.0,
        "Sudarsky class I gas giant" => 3_974.0,
        "Sudarsky class II gas giant" => 28_405.0,
        _ => {
            if terraformable {
                129_504.0
            } else {
                300.0
            }
        }
    }
}
