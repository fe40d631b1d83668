//! Unit tests for the discovery query compiler.
//!
//! The compiler is a pure function over the request, the lowered conditions
//! and a resolved type map, so its SQL and parameter vector can be asserted
//! without a database.
//!
//! Run with: cargo test --test discovery_compiler_test

use std::collections::HashMap;

use telemetry_db::entity::DataType;
use telemetry_db::filter::{
    lower, parse, DiscoveryRequest, MeasurementFilter, TimeRange, TimeseriesFilter,
    ValueCondition,
};
use telemetry_db::services::discovery::{compile, CompiledQuery};

fn types(entries: &[(&str, DataType)]) -> HashMap<String, DataType> {
    entries
        .iter()
        .map(|(name, dt)| ((*name).to_string(), *dt))
        .collect()
}

fn conditions(expression: &str) -> Vec<ValueCondition> {
    lower(&parse(expression).unwrap().unwrap())
}

/// Every `$n` placeholder from 1 to the parameter count must appear.
fn assert_dense_numbering(compiled: &CompiledQuery) {
    for i in 1..=compiled.values.len() {
        assert!(
            compiled.sql.contains(&format!("${i}")),
            "missing ${i} in: {}",
            compiled.sql
        );
    }
    assert!(
        !compiled.sql.contains(&format!("${}", compiled.values.len() + 1)),
        "placeholder beyond parameter count in: {}",
        compiled.sql
    );
}

#[test]
fn bare_request_selects_active_sensors_ordered_by_name() {
    let compiled = compile(&DiscoveryRequest::default(), &[], &types(&[])).unwrap();

    assert!(compiled.sql.starts_with("SELECT DISTINCT s.id, s.name"));
    assert!(compiled.sql.contains("s.is_active = true"));
    assert!(compiled.sql.ends_with("ORDER BY s.name"));
    assert!(compiled.values.is_empty());
}

#[test]
fn required_types_compile_to_all_semantics() {
    let req = DiscoveryRequest {
        timeseries_filter: Some(TimeseriesFilter {
            required_types: vec!["temp".to_string(), "humidity".to_string()],
            ..Default::default()
        }),
        ..Default::default()
    };
    let compiled = compile(&req, &[], &types(&[])).unwrap();

    assert!(compiled.sql.contains("t_req.name IN ($1,$2)"));
    assert!(compiled.sql.contains("GROUP BY ts_req.sensor_id"));
    assert!(compiled.sql.contains("HAVING COUNT(DISTINCT t_req.id) = 2"));
    assert_eq!(compiled.values.len(), 2);
    assert_dense_numbering(&compiled);
}

#[test]
fn optional_types_compile_to_any_semantics() {
    let req = DiscoveryRequest {
        timeseries_filter: Some(TimeseriesFilter {
            optional_types: vec!["pressure".to_string()],
            ..Default::default()
        }),
        ..Default::default()
    };
    let compiled = compile(&req, &[], &types(&[])).unwrap();

    assert!(compiled.sql.contains("t.name IN ($1)"));
    assert!(!compiled.sql.contains("HAVING"));
}

#[test]
fn dataset_names_add_dataset_joins() {
    let req = DiscoveryRequest {
        timeseries_filter: Some(TimeseriesFilter {
            dataset_names: vec!["weather".to_string()],
            ..Default::default()
        }),
        ..Default::default()
    };
    let compiled = compile(&req, &[], &types(&[])).unwrap();

    assert!(compiled
        .sql
        .contains("JOIN dataset_types dt ON t.id = dt.type_id"));
    assert!(compiled
        .sql
        .contains("JOIN datasets d ON dt.dataset_id = d.id"));
    assert!(compiled.sql.contains("d.name IN ($1)"));
}

#[test]
fn value_condition_joins_the_typed_measurement_table() {
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: "temp.gteq.20".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let conditions = conditions("temp.gteq.20");
    let compiled = compile(&req, &conditions, &types(&[("temp", DataType::Numeric)])).unwrap();

    assert!(compiled.sql.contains("JOIN timeseries ts_temp"));
    assert!(compiled.sql.contains("measurements_numeric m_temp"));
    assert!(compiled
        .sql
        .contains("(SELECT id FROM \"types\" WHERE name = $1)"));
    assert!(compiled.sql.contains("(m_temp.value)::numeric >= $2"));
    assert_dense_numbering(&compiled);
}

#[test]
fn latest_only_wraps_the_join_in_a_ranked_subquery() {
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            latest_only: true,
            expression: "temp.gt.30".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let conditions = conditions("temp.gt.30");
    let compiled = compile(&req, &conditions, &types(&[("temp", DataType::Numeric)])).unwrap();

    assert!(compiled.sql.contains(
        "ROW_NUMBER() OVER (PARTITION BY timeseries_id ORDER BY timestamp DESC) AS rn"
    ));
    assert!(compiled.sql.contains("m_temp.rn = 1"));
    // No time-range predicates in latest mode
    assert!(!compiled.sql.contains("m_temp.timestamp"));
}

#[test]
fn time_range_binds_start_and_end() {
    let start = "2024-01-01T00:00:00Z".parse().unwrap();
    let end = "2024-02-01T00:00:00Z".parse().unwrap();
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: "temp.gteq.20".to_string(),
            time_range: Some(TimeRange {
                start_time: Some(start),
                end_time: Some(end),
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    let conditions = conditions("temp.gteq.20");
    let compiled = compile(&req, &conditions, &types(&[("temp", DataType::Numeric)])).unwrap();

    assert!(compiled.sql.contains("m_temp.timestamp >= $2"));
    assert!(compiled.sql.contains("m_temp.timestamp <= $3"));
    assert_eq!(compiled.values.len(), 4); // type name, start, end, threshold
    assert_dense_numbering(&compiled);
}

#[test]
fn same_type_conditions_share_one_alias_pair() {
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: "and(temp.gteq.20, temp.lteq.30)".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let conditions = conditions("and(temp.gteq.20, temp.lteq.30)");
    let compiled = compile(&req, &conditions, &types(&[("temp", DataType::Numeric)])).unwrap();

    assert_eq!(compiled.sql.matches("JOIN timeseries ts_temp").count(), 1);
    assert!(compiled.sql.contains("(m_temp.value)::numeric >= $2"));
    assert!(compiled.sql.contains("(m_temp.value)::numeric <= $3"));
}

#[test]
fn json_path_predicates_extract_and_cast() {
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: "meta.depth.cm.gteq.12".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let conditions = conditions("meta.depth.cm.gteq.12");
    let compiled = compile(&req, &conditions, &types(&[("meta", DataType::Json)])).unwrap();

    assert!(compiled.sql.contains("m_meta.value #>> $2::text[]"));
    assert!(compiled.sql.contains("::numeric >= $3"));
    assert!(compiled
        .values
        .iter()
        .any(|v| format!("{v:?}").contains("depth,cm")));
}

#[test]
fn in_list_binds_each_element() {
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: "status.in.(\"ok\",\"warn\")".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let conditions = conditions("status.in.(\"ok\",\"warn\")");
    let compiled = compile(&req, &conditions, &types(&[("status", DataType::String)])).unwrap();

    assert!(compiled.sql.contains("m_status.value IN ($2,$3)"));
    assert_eq!(compiled.values.len(), 3);
}

#[test]
fn spatial_operators_compile_to_postgis_predicates() {
    let expression = "location.bbi.(11,46,12,47)";
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: expression.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let compiled = compile(
        &req,
        &conditions(expression),
        &types(&[("location", DataType::Geoposition)]),
    )
    .unwrap();
    assert!(compiled
        .sql
        .contains("ST_Intersects(m_location.value, ST_MakeEnvelope($2, $3, $4, $5, 4326))"));

    let expression = "area.bbc.(11,46,12,47)";
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: expression.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let compiled = compile(
        &req,
        &conditions(expression),
        &types(&[("area", DataType::Geoshape)]),
    )
    .unwrap();
    assert!(compiled
        .sql
        .contains("ST_Contains(ST_MakeEnvelope($2, $3, $4, $5, 4326), m_area.value)"));

    let expression = "location.dlt.(11.3,46.5,5000)";
    let req = DiscoveryRequest {
        measurement_filter: Some(MeasurementFilter {
            expression: expression.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let compiled = compile(
        &req,
        &conditions(expression),
        &types(&[("location", DataType::Geoposition)]),
    )
    .unwrap();
    assert!(compiled.sql.contains("ST_DWithin"));
    assert!(compiled.sql.contains("ST_SetSRID(ST_MakePoint($2, $3), 4326)"));
}

#[test]
fn positive_limit_is_the_last_parameter() {
    let req = DiscoveryRequest {
        timeseries_filter: Some(TimeseriesFilter {
            optional_types: vec!["temp".to_string()],
            ..Default::default()
        }),
        limit: Some(25),
        ..Default::default()
    };
    let compiled = compile(&req, &[], &types(&[])).unwrap();

    assert!(compiled.sql.ends_with("LIMIT $2"));
    assert_eq!(
        compiled.values.last().unwrap(),
        &sea_orm::Value::BigInt(Some(25))
    );

    // Zero limit is ignored
    let req = DiscoveryRequest {
        limit: Some(0),
        ..Default::default()
    };
    let compiled = compile(&req, &[], &types(&[])).unwrap();
    assert!(!compiled.sql.contains("LIMIT"));
}
