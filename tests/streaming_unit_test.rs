//! Unit tests for the streaming subscription layer: cursor query
//! compilation, retraction/snapshot row handling, and the WebSocket
//! init-frame mode policy.
//!
//! Run with: cargo test --test streaming_unit_test

use std::collections::HashMap;

use sea_orm::prelude::Decimal;
use telemetry_db::entity::DataType;
use telemetry_db::filter::{lower, parse};
use telemetry_db::services::spatial::split_spatial;
use telemetry_db::streaming::session::{validate_mode, ModePolicy, SubscribePayload, SubscriptionMode};
use telemetry_db::streaming::view::{
    compile_subscribe, partition_data_types, should_deliver, SubscriptionSpec,
};

fn types(entries: &[(&str, DataType)]) -> HashMap<String, DataType> {
    entries
        .iter()
        .map(|(name, dt)| ((*name).to_string(), *dt))
        .collect()
}

#[test]
fn retractions_are_never_delivered() {
    let mut watermark = None;

    // Insertion then retraction of the same row: exactly one delivery.
    assert!(should_deliver(Decimal::from(1000), 1, false, &mut watermark));
    assert!(!should_deliver(Decimal::from(1001), -1, false, &mut watermark));
}

#[test]
fn watermark_simulation_drops_the_snapshot() {
    let mut watermark = None;

    // Snapshot rows all carry the first observed timestamp.
    assert!(!should_deliver(Decimal::from(500), 1, true, &mut watermark));
    assert!(!should_deliver(Decimal::from(500), 1, true, &mut watermark));
    // The next producer insertion advances past the watermark.
    assert!(should_deliver(Decimal::from(501), 1, true, &mut watermark));
    // Retractions stay dropped even past the watermark.
    assert!(!should_deliver(Decimal::from(502), -1, true, &mut watermark));
}

#[test]
fn subscribe_query_targets_the_datatype_view() {
    let spec = SubscriptionSpec {
        sensor_names: vec!["s1".to_string(), "s2".to_string()],
        type_names: vec!["temp".to_string()],
        ..Default::default()
    };
    let compiled = compile_subscribe(
        DataType::Numeric,
        &spec,
        &types(&[("temp", DataType::Numeric)]),
        true,
    )
    .unwrap();

    assert!(compiled
        .sql
        .starts_with("DECLARE c CURSOR FOR SUBSCRIBE TO (SELECT"));
    assert!(compiled.sql.contains("FROM latest_measurements_numeric"));
    assert!(compiled.sql.contains("sensor_name IN ($1,$2)"));
    assert!(compiled.sql.contains("type_name IN ($3)"));
    assert!(!compiled.sql.contains("SNAPSHOT"));
    assert_eq!(compiled.values.len(), 3);
}

#[test]
fn snapshot_clause_is_appended_only_when_supported() {
    let spec = SubscriptionSpec {
        sensor_names: vec!["s1".to_string()],
        skip_initial_snapshot: true,
        ..Default::default()
    };

    let with_clause = compile_subscribe(DataType::Numeric, &spec, &types(&[]), true).unwrap();
    assert!(with_clause.sql.ends_with("WITH (SNAPSHOT = false)"));

    let without_clause = compile_subscribe(DataType::Numeric, &spec, &types(&[]), false).unwrap();
    assert!(!without_clause.sql.contains("SNAPSHOT"));
}

#[test]
fn value_conditions_apply_only_to_their_own_type_and_partition() {
    let expr = parse("and(temp.gteq.20, note.re.\"x\")").unwrap().unwrap();
    let (pushdown, _) = split_spatial(lower(&expr));
    let type_map = types(&[("temp", DataType::Numeric), ("note", DataType::String)]);

    let spec = SubscriptionSpec {
        conditions: pushdown,
        ..Default::default()
    };

    let numeric = compile_subscribe(DataType::Numeric, &spec, &type_map, true).unwrap();
    assert!(numeric.sql.contains("type_name <> $1 OR"));
    assert!(numeric.sql.contains("(m.value)::numeric >= $2"));
    // The string-typed condition stays out of the numeric partition.
    assert!(!numeric.sql.contains("~"));

    let string = compile_subscribe(DataType::String, &spec, &type_map, true).unwrap();
    assert!(string.sql.contains("m.value ~ $2"));
    assert!(!string.sql.contains("::numeric"));
}

#[test]
fn unconstrained_subscriptions_cover_all_datatypes() {
    assert_eq!(partition_data_types(&types(&[])).len(), 6);

    let partitions = partition_data_types(&types(&[
        ("temp", DataType::Numeric),
        ("humidity", DataType::Numeric),
        ("location", DataType::Geoposition),
    ]));
    assert_eq!(partitions.len(), 2);
    assert!(partitions.contains(&DataType::Numeric));
    assert!(partitions.contains(&DataType::Geoposition));
}

#[test]
fn mode_policy_enforcement() {
    let simple = SubscribePayload {
        sensor_names: vec!["s1".to_string()],
        ..Default::default()
    };
    let advanced = SubscribePayload {
        timeseries_filter: Some(Default::default()),
        ..Default::default()
    };
    let empty = SubscribePayload::default();

    assert_eq!(
        validate_mode(&simple, ModePolicy::Any).unwrap(),
        SubscriptionMode::Simple
    );
    assert_eq!(
        validate_mode(&advanced, ModePolicy::Any).unwrap(),
        SubscriptionMode::Advanced
    );
    assert!(validate_mode(&empty, ModePolicy::Any).is_err());

    assert!(validate_mode(&advanced, ModePolicy::SimpleOnly).is_err());
    assert!(validate_mode(&empty, ModePolicy::SimpleOnly).is_err());
    assert_eq!(
        validate_mode(&simple, ModePolicy::SimpleOnly).unwrap(),
        SubscriptionMode::Simple
    );

    assert!(validate_mode(&simple, ModePolicy::AdvancedOnly).is_err());
    assert_eq!(
        validate_mode(&advanced, ModePolicy::AdvancedOnly).unwrap(),
        SubscriptionMode::Advanced
    );
}
