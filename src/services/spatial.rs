//! Application-layer evaluation of geospatial filter conditions.
//!
//! The streaming source cannot evaluate the geospatial operators, so the
//! subscription manager hands them back to the session as post-filters over
//! the decoded WKT values.

use geo::{BoundingRect, Centroid, Intersects};
use geo_types::{coord, Geometry, Point, Rect};
use std::str::FromStr;

use crate::entity::DataType;
use crate::filter::{FilterOperator, FilterValue, ValueCondition};
use crate::services::codec::MeasurementValue;

/// Mean Earth radius used by the distance operator, in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geospatial condition evaluated at the application layer.
///
/// `bbi`/`bbc` carry `[min_lon, min_lat, max_lon, max_lat]`, `dlt` carries
/// `[lon, lat, meters]`; arity is enforced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCondition {
    pub type_name: String,
    pub operator: FilterOperator,
    pub coordinates: Vec<f64>,
}

/// Partition lowered conditions into pushdown-able and spatial ones.
#[must_use]
pub fn split_spatial(
    conditions: Vec<ValueCondition>,
) -> (Vec<ValueCondition>, Vec<SpatialCondition>) {
    let mut pushdown = Vec::new();
    let mut spatial = Vec::new();

    for condition in conditions {
        if condition.is_spatial() {
            if let FilterValue::Coordinates(coords) = &condition.value {
                spatial.push(SpatialCondition {
                    type_name: condition.type_name.clone(),
                    operator: condition.operator,
                    coordinates: coords.clone(),
                });
            }
        } else {
            pushdown.push(condition);
        }
    }

    (pushdown, spatial)
}

/// Evaluate the post-filter policy for one update.
///
/// Only filters targeting the update's type are considered; the update
/// passes if any of them is satisfied, or if none targets its type.
/// Non-geometric datatypes always pass.
#[must_use]
pub fn passes(
    data_type: DataType,
    type_name: &str,
    value: &MeasurementValue,
    filters: &[SpatialCondition],
) -> bool {
    if !data_type.is_geometry() {
        return true;
    }

    let matching: Vec<&SpatialCondition> = filters
        .iter()
        .filter(|f| f.type_name == type_name)
        .collect();
    if matching.is_empty() {
        return true;
    }

    let MeasurementValue::Wkt(text) = value else {
        return false;
    };
    let Some(geometry) = parse_wkt(text) else {
        tracing::warn!(wkt = %text, "Failed to parse geometry value for spatial filter");
        return false;
    };

    matching.iter().any(|f| evaluate(f, &geometry))
}

fn parse_wkt(text: &str) -> Option<Geometry<f64>> {
    let parsed = wkt::Wkt::<f64>::from_str(text).ok()?;
    Geometry::try_from(parsed).ok()
}

fn evaluate(filter: &SpatialCondition, geometry: &Geometry<f64>) -> bool {
    match filter.operator {
        FilterOperator::Bbi => {
            let Some(envelope) = envelope(&filter.coordinates) else {
                return false;
            };
            geometry
                .bounding_rect()
                .is_some_and(|rect| rect.intersects(&envelope))
        }
        FilterOperator::Bbc => {
            let Some(envelope) = envelope(&filter.coordinates) else {
                return false;
            };
            geometry.bounding_rect().is_some_and(|rect| {
                rect.min().x >= envelope.min().x
                    && rect.min().y >= envelope.min().y
                    && rect.max().x <= envelope.max().x
                    && rect.max().y <= envelope.max().y
            })
        }
        FilterOperator::Dlt => {
            let [lon, lat, meters] = filter.coordinates[..] else {
                return false;
            };
            geometry
                .centroid()
                .is_some_and(|center| haversine_distance(Point::new(lon, lat), center) <= meters)
        }
        _ => false,
    }
}

fn envelope(coords: &[f64]) -> Option<Rect<f64>> {
    let [min_lon, min_lat, max_lon, max_lat] = coords[..] else {
        return None;
    };
    Some(Rect::new(
        coord! { x: min_lon, y: min_lat },
        coord! { x: max_lon, y: max_lat },
    ))
}

/// Great-circle distance between two lon/lat points, in meters.
#[must_use]
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.y().to_radians().cos() * b.y().to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}
