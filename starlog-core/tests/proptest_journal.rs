//! Property tests: the parser must survive arbitrary input, and the merge
//! and valuation rules must hold for any field combination.

use proptest::prelude::*;

use starlog_core::journal::{ParseOutcome, ScanInfo, parse_line};
use starlog_core::store::BodyPatch;
use starlog_core::value;

proptest! {
    /// The parser is total: any string yields an outcome, never a panic.
    #[test]
    fn parser_never_panics(line in ".*") {
        let _ = parse_line(&line);
    }

    /// JSON objects with arbitrary event tags and junk fields never panic
    /// and never produce an event without the required envelope.
    #[test]
    fn arbitrary_json_objects_are_handled(
        tag in "[A-Za-z]{0,20}",
        key in "[A-Za-z]{1,12}",
        num in any::<i64>(),
    ) {
        let line = format!(r#"{{"event":"{tag}","{key}":{num}}}"#);
        // No timestamp: whatever the tag, this can never be an event.
        prop_assert!(!matches!(parse_line(&line), ParseOutcome::Event(_)));
    }

    /// Merging a patch into itself twice equals merging it once.
    #[test]
    fn body_patch_merge_is_idempotent(
        name in proptest::option::of("[a-zA-Z0-9 ]{1,16}"),
        distance in proptest::option::of(0.0f64..1.0e6),
        landable in proptest::option::of(any::<bool>()),
        scanned in proptest::option::of(any::<bool>()),
        current in proptest::option::of(0i64..10_000_000),
    ) {
        let mut base = BodyPatch {
            body_id: 1,
            name: Some("base".to_string()),
            ..BodyPatch::default()
        };
        let patch = BodyPatch {
            body_id: 1,
            name: name.clone(),
            distance_ls: distance,
            landable,
            scanned,
            current_value: current,
            ..BodyPatch::default()
        };
        base.merge(&patch);
        let once = base.clone();
        base.merge(&patch);
        prop_assert_eq!(&base, &once);
        // Present fields won; absent fields kept the base value.
        match &name {
            Some(n) => prop_assert_eq!(base.name.as_deref(), Some(n.as_str())),
            None => prop_assert_eq!(base.name.as_deref(), Some("base")),
        }
    }

    /// Patches touching disjoint fields commute.
    #[test]
    fn disjoint_patches_commute(
        distance in 0.0f64..1.0e6,
        current in 0i64..10_000_000,
    ) {
        let a = BodyPatch {
            body_id: 1,
            distance_ls: Some(distance),
            ..BodyPatch::default()
        };
        let b = BodyPatch {
            body_id: 1,
            current_value: Some(current),
            ..BodyPatch::default()
        };
        let mut ab = BodyPatch { body_id: 1, ..BodyPatch::default() };
        ab.merge(&a);
        ab.merge(&b);
        let mut ba = BodyPatch { body_id: 1, ..BodyPatch::default() };
        ba.merge(&b);
        ba.merge(&a);
        prop_assert_eq!(ab, ba);
    }

    /// Valuation invariants: positive, floored, and max dominates current.
    #[test]
    fn body_value_bounds(
        mass in proptest::option::of(0.0f64..10_000.0),
        terraformable in any::<bool>(),
        discovered in proptest::option::of(any::<bool>()),
        mapped in any::<bool>(),
        class in prop_oneof![
            Just("Earthlike body"),
            Just("Water world"),
            Just("Ammonia world"),
            Just("High metal content body"),
            Just("Icy body"),
            Just("Rocky body"),
            Just("Sudarsky class I gas giant"),
        ],
    ) {
        let scan = ScanInfo {
            body_name: "X 1".to_string(),
            body_id: 1,
            planet_class: Some(class.to_string()),
            terraform_state: terraformable.then(|| "Terraformable".to_string()),
            mass,
            was_discovered: discovered,
            ..ScanInfo::default()
        };
        let estimate = value::estimate(&scan, mapped);
        prop_assert!(estimate.current >= 500);
        prop_assert!(estimate.max >= estimate.current);
        if mapped {
            prop_assert_eq!(estimate.current, estimate.max);
        }
    }

    /// Star scans are never mappable: current always equals max.
    #[test]
    fn star_value_has_no_mapping_headroom(
        mass in 0.01f64..100.0,
        class in prop_oneof![Just("G"), Just("K"), Just("M"), Just("N"), Just("DA")],
    ) {
        let scan = ScanInfo {
            body_name: "X".to_string(),
            body_id: 0,
            star_class: Some(class.to_string()),
            mass: Some(mass),
            distance_ls: Some(0.0),
            ..ScanInfo::default()
        };
        let estimate = value::estimate(&scan, false);
        prop_assert_eq!(estimate.current, estimate.max);
    }
}
