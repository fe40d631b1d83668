//! Unit tests for the geospatial post-filter.
//!
//! Run with: cargo test --test spatial_test

use geo_types::Point;
use telemetry_db::entity::DataType;
use telemetry_db::filter::{lower, parse, FilterOperator};
use telemetry_db::services::codec::MeasurementValue;
use telemetry_db::services::spatial::{haversine_distance, passes, split_spatial, SpatialCondition};

fn bbi(type_name: &str, coords: [f64; 4]) -> SpatialCondition {
    SpatialCondition {
        type_name: type_name.to_string(),
        operator: FilterOperator::Bbi,
        coordinates: coords.to_vec(),
    }
}

fn wkt(text: &str) -> MeasurementValue {
    MeasurementValue::Wkt(text.to_string())
}

#[test]
fn split_separates_spatial_from_pushdown_conditions() {
    let expr = parse("or(temp.gteq.20, and(humidity.lt.80, location.bbi.(11,46,12,47)))")
        .unwrap()
        .unwrap();
    let (pushdown, spatial) = split_spatial(lower(&expr));

    assert_eq!(pushdown.len(), 2);
    assert_eq!(spatial.len(), 1);
    assert_eq!(spatial[0].type_name, "location");
    assert_eq!(spatial[0].operator, FilterOperator::Bbi);
    assert_eq!(spatial[0].coordinates, vec![11.0, 46.0, 12.0, 47.0]);
}

#[test]
fn bbox_intersect_accepts_and_rejects() {
    let filters = [bbi("location", [11.0, 46.0, 12.0, 47.0])];
    assert!(passes(
        DataType::Geoposition,
        "location",
        &wkt("POINT(11.35 46.5)"),
        &filters
    ));

    let far = [bbi("location", [0.0, 0.0, 1.0, 1.0])];
    assert!(!passes(
        DataType::Geoposition,
        "location",
        &wkt("POINT(11.35 46.5)"),
        &far
    ));
}

#[test]
fn bbox_contain_requires_both_corners_inside() {
    let contain = |coords: [f64; 4]| SpatialCondition {
        type_name: "area".to_string(),
        operator: FilterOperator::Bbc,
        coordinates: coords.to_vec(),
    };

    let polygon = wkt("POLYGON((11.1 46.1,11.4 46.1,11.4 46.4,11.1 46.4,11.1 46.1))");

    // Fully inside
    assert!(passes(
        DataType::Geoshape,
        "area",
        &polygon,
        &[contain([11.0, 46.0, 12.0, 47.0])]
    ));
    // Overlapping but not contained
    assert!(!passes(
        DataType::Geoshape,
        "area",
        &polygon,
        &[contain([11.2, 46.0, 12.0, 47.0])]
    ));
}

#[test]
fn distance_filter_uses_meters() {
    let near = SpatialCondition {
        type_name: "location".to_string(),
        operator: FilterOperator::Dlt,
        coordinates: vec![11.35, 46.5, 5_000.0],
    };
    assert!(passes(
        DataType::Geoposition,
        "location",
        &wkt("POINT(11.36 46.5)"),
        &[near.clone()]
    ));

    // ~78 km away
    assert!(!passes(
        DataType::Geoposition,
        "location",
        &wkt("POINT(12.37 46.5)"),
        &[near]
    ));
}

#[test]
fn filters_apply_only_to_matching_type_names() {
    let filters = [bbi("location", [0.0, 0.0, 1.0, 1.0])];

    // Another geometry type is untargeted and passes
    assert!(passes(
        DataType::Geoposition,
        "other_location",
        &wkt("POINT(11.35 46.5)"),
        &filters
    ));
    // Non-geometric datatypes always pass
    assert!(passes(
        DataType::Numeric,
        "location",
        &MeasurementValue::Numeric(1.0),
        &filters
    ));
    // No filters at all passes
    assert!(passes(
        DataType::Geoposition,
        "location",
        &wkt("POINT(11.35 46.5)"),
        &[]
    ));
}

#[test]
fn any_matching_filter_suffices() {
    let filters = [
        bbi("location", [0.0, 0.0, 1.0, 1.0]),
        bbi("location", [11.0, 46.0, 12.0, 47.0]),
    ];
    assert!(passes(
        DataType::Geoposition,
        "location",
        &wkt("POINT(11.35 46.5)"),
        &filters
    ));
}

#[test]
fn unparseable_geometry_is_rejected_when_targeted() {
    let filters = [bbi("location", [11.0, 46.0, 12.0, 47.0])];
    assert!(!passes(
        DataType::Geoposition,
        "location",
        &wkt("not-a-geometry"),
        &filters
    ));
}

#[test]
fn haversine_matches_known_distance() {
    // One degree of longitude at the equator is ~111.19 km
    let d = haversine_distance(Point::new(0.0, 0.0), Point::new(1.0, 0.0));
    assert!((d - 111_000.0).abs() / 111_000.0 < 0.01, "got {d}");

    let zero = haversine_distance(Point::new(11.35, 46.5), Point::new(11.35, 46.5));
    assert!(zero.abs() < 1e-6);
}
