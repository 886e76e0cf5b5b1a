//! Property-based tests for records and the node graph

use super::delta::StateDelta;
use super::record::*;
use super::state::*;
use super::transition::*;
use chrono::NaiveDate;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use uuid::Uuid;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_next_step() -> impl Strategy<Value = NextStep> {
    prop::sample::select(NextStep::ALL.to_vec())
}

fn arb_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[A-Za-z][A-Za-z ]{0,15}")
}

fn arb_client() -> impl Strategy<Value = ClientRecord> {
    (
        any::<bool>(),
        arb_text(),
        arb_text(),
        prop::option::of((1930i32..2010, 1u32..13, 1u32..29)),
        prop::option::of("[0-9]{7,11}"),
        prop::option::of(prop_oneof![
            Just(DocumentType::Dni),
            Just(DocumentType::Cuit),
            Just(DocumentType::Cuil),
        ]),
        prop::option::of("[a-z]{1,8}@[a-z]{1,8}\\.com"),
        prop::option::of("[0-9]{8,12}"),
    )
        .prop_map(
            |(has_id, name, last_name, birth, doc, doc_type, email, phone)| ClientRecord {
                id: has_id.then(Uuid::new_v4),
                name,
                last_name,
                birth_date: birth.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
                document_number: doc,
                document_type: doc_type,
                email,
                phone,
            },
        )
}

fn arb_vehicle() -> impl Strategy<Value = VehicleRecord> {
    (
        any::<bool>(),
        prop::option::of("[A-Z]{2}[0-9]{3}[A-Z]{2}"),
        arb_text(),
        arb_text(),
        prop::option::of(1990i32..2026),
        prop::option::of(0u32..400_000),
    )
        .prop_map(|(has_id, plate, brand, model, year, mileage)| VehicleRecord {
            id: has_id.then(Uuid::new_v4),
            license_plate: plate,
            brand,
            model,
            year,
            mileage,
        })
}

/// Extraction payloads with a mix of nulls, blanks, junk and real values
fn arb_extraction(keys: &'static [&'static str]) -> impl Strategy<Value = Map<String, Value>> {
    let value = prop_oneof![
        Just(Value::Null),
        Just(json!("")),
        Just(json!("   ")),
        "[A-Za-z0-9 ]{1,12}".prop_map(Value::from),
        (0i64..300_000).prop_map(Value::from),
    ];
    prop::collection::vec(prop::option::of(value), keys.len()).prop_map(move |values| {
        keys.iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| ((*k).to_string(), v)))
            .collect()
    })
}

const CLIENT_KEYS: &[&str] = &[
    "name",
    "last_name",
    "birth_date",
    "document_number",
    "document_type",
    "email",
    "phone",
];

const VEHICLE_KEYS: &[&str] = &["license_plate", "brand", "model", "year", "mileage"];

fn present<R: IntakeRecord>(record: &R) -> Vec<&'static str> {
    R::field_specs()
        .iter()
        .filter(|s| record.field_value(s.name).is_some())
        .map(|s| s.name)
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_turn_reaches_end_in_three_hops(step in arb_next_step()) {
        let state = SessionState { next_step: step, ..Default::default() };
        let mut node = Node::Router;
        let mut hops = 0;
        while !node.is_terminal() {
            node = transition(node, &state).unwrap();
            hops += 1;
            prop_assert!(hops <= 3);
        }
        prop_assert!(hops >= 2);
    }

    #[test]
    fn prop_parse_lenient_roundtrips_known_names(step in arb_next_step()) {
        prop_assert_eq!(NextStep::parse_lenient(step.as_str()), step);
    }

    #[test]
    fn prop_parse_lenient_is_total(raw in ".{0,30}") {
        let step = NextStep::parse_lenient(&raw);
        prop_assert!(NextStep::ALL.contains(&step));
    }

    #[test]
    fn prop_client_merge_never_nulls(
        client in arb_client(),
        extracted in arb_extraction(CLIENT_KEYS),
    ) {
        let before = present(&client);
        let mut merged = client.clone();
        let _ = merged.merge_extracted(&extracted);
        for name in before {
            prop_assert!(merged.field_value(name).is_some(), "{} was nulled", name);
        }
        prop_assert_eq!(merged.id, client.id);
    }

    #[test]
    fn prop_vehicle_merge_never_nulls(
        vehicle in arb_vehicle(),
        extracted in arb_extraction(VEHICLE_KEYS),
    ) {
        let before = present(&vehicle);
        let mut merged = vehicle.clone();
        let _ = merged.merge_extracted(&extracted);
        for name in before {
            prop_assert!(merged.field_value(name).is_some(), "{} was nulled", name);
        }
    }

    #[test]
    fn prop_confirmation_lists_exactly_present_fields(client in arb_client()) {
        let request = client.confirmation_request();
        let listed: Vec<&str> = request.field_names().collect();
        prop_assert_eq!(listed, present(&client));
    }

    #[test]
    fn prop_reject_clears_listed_fields_only(vehicle in arb_vehicle()) {
        let request = vehicle.confirmation_request();
        let mut cleared = vehicle.clone();
        cleared.clear_fields(request.field_names());
        prop_assert!(present(&cleared).is_empty());
        prop_assert_eq!(cleared.id, vehicle.id);
    }

    #[test]
    fn prop_complete_implies_ready_for_client(client in arb_client()) {
        if client.is_complete() {
            prop_assert!(client.ready_for_confirmation());
            prop_assert!(client.id.is_some());
        }
    }

    #[test]
    fn prop_empty_delta_is_identity(client in arb_client(), vehicle in arb_vehicle(), step in arb_next_step()) {
        let state = SessionState { client, vehicle, next_step: step, ..Default::default() };
        let mut applied = state.clone();
        applied.apply(StateDelta::default());
        prop_assert_eq!(applied, state);
    }

    #[test]
    fn prop_state_survives_checkpoint_serialization(client in arb_client(), vehicle in arb_vehicle()) {
        let state = SessionState {
            confirmation: Some(vehicle.confirmation_request()),
            client,
            vehicle,
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(restored, state);
    }
}
