//! Conversion between raw stored values and their canonical wire form.
//!
//! Decoding is total: anything that fails to parse as its declared datatype
//! falls through to the raw string, so a malformed row degrades instead of
//! failing a whole response. Geometry values scanned from the store arrive
//! either as hex EWKB or already as WKT; both end up as WKT with SRID 4326.

use geozero::ToWkt as _;
use serde::Serialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use wkt::ToWkt as _;

use crate::entity::DataType;
use crate::error::{AppError, AppResult};

/// A measurement value in canonical wire form, one constructor per datatype.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum MeasurementValue {
    Numeric(f64),
    Boolean(bool),
    Text(String),
    Json(JsonValue),
    /// Geometry in WKT form, SRID 4326.
    Wkt(String),
}

/// Decode a raw textual value scanned from the store.
#[must_use]
pub fn decode_value(raw: &str, data_type: DataType) -> MeasurementValue {
    match data_type {
        DataType::Numeric => match raw.parse::<f64>() {
            Ok(n) => MeasurementValue::Numeric(n),
            Err(_) => MeasurementValue::Text(raw.to_string()),
        },
        DataType::String => MeasurementValue::Text(raw.to_string()),
        DataType::Boolean => match raw {
            "true" | "1" => MeasurementValue::Boolean(true),
            "false" | "0" => MeasurementValue::Boolean(false),
            _ => MeasurementValue::Text(raw.to_string()),
        },
        DataType::Json => match serde_json::from_str::<JsonValue>(raw) {
            Ok(v) => MeasurementValue::Json(v),
            Err(_) => MeasurementValue::Text(raw.to_string()),
        },
        DataType::Geoposition | DataType::Geoshape => decode_geometry(raw),
    }
}

/// Hex EWKB to WKT; values already in WKT (or undecodable) pass through.
fn decode_geometry(raw: &str) -> MeasurementValue {
    if let Ok(bytes) = hex::decode(raw) {
        if let Ok(text) = geozero::wkb::Ewkb(bytes).to_wkt() {
            return MeasurementValue::Wkt(text);
        }
    }
    MeasurementValue::Wkt(raw.to_string())
}

/// Infer the datatype of an incoming JSON measurement value.
///
/// GeoJSON Point/Polygon objects map to the geometry datatypes; any other
/// object or array is opaque JSON.
#[must_use]
pub fn infer_data_type(value: &JsonValue) -> DataType {
    match value {
        JsonValue::Bool(_) => DataType::Boolean,
        JsonValue::Number(_) => DataType::Numeric,
        JsonValue::String(_) => DataType::String,
        JsonValue::Object(map) => match map.get("type").and_then(JsonValue::as_str) {
            Some("Point") if map.contains_key("coordinates") => DataType::Geoposition,
            Some("Polygon") if map.contains_key("coordinates") => DataType::Geoshape,
            _ => DataType::Json,
        },
        JsonValue::Array(_) => DataType::Json,
        JsonValue::Null => DataType::String,
    }
}

/// Encode an incoming JSON value for storage under the given datatype.
///
/// # Errors
///
/// Returns a validation error when a geometry datatype receives anything
/// other than the matching GeoJSON geometry.
pub fn encode_value(value: &JsonValue, data_type: DataType) -> AppResult<MeasurementValue> {
    match data_type {
        DataType::Numeric => {
            let n = match value {
                JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
                JsonValue::String(s) => s.parse::<f64>().unwrap_or(0.0),
                _ => 0.0,
            };
            Ok(MeasurementValue::Numeric(n))
        }
        DataType::Boolean => {
            let b = match value {
                JsonValue::Bool(b) => *b,
                JsonValue::String(s) => matches!(s.as_str(), "true" | "1" | "yes"),
                _ => false,
            };
            Ok(MeasurementValue::Boolean(b))
        }
        DataType::String => match value {
            JsonValue::String(s) => Ok(MeasurementValue::Text(s.clone())),
            other => Ok(MeasurementValue::Text(
                serde_json::to_string(other)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            )),
        },
        DataType::Json => Ok(MeasurementValue::Json(value.clone())),
        DataType::Geoposition => {
            let point: geo_types::Point<f64> = parse_geojson(value, "geoposition")?
                .try_into()
                .map_err(|_| {
                    AppError::Validation("geoposition value must be a GeoJSON Point".to_string())
                })?;
            Ok(MeasurementValue::Wkt(point.wkt_string()))
        }
        DataType::Geoshape => {
            let polygon: geo_types::Polygon<f64> = parse_geojson(value, "geoshape")?
                .try_into()
                .map_err(|_| {
                    AppError::Validation("geoshape value must be a GeoJSON Polygon".to_string())
                })?;
            Ok(MeasurementValue::Wkt(polygon.wkt_string()))
        }
    }
}

fn parse_geojson(value: &JsonValue, datatype: &str) -> AppResult<geojson::Geometry> {
    geojson::Geometry::from_json_value(value.clone())
        .map_err(|e| AppError::Validation(format!("invalid {datatype} value: {e}")))
}
