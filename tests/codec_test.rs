//! Unit tests for the typed value codec.
//!
//! Run with: cargo test --test codec_test

use serde_json::json;
use telemetry_db::entity::DataType;
use telemetry_db::services::codec::{decode_value, encode_value, infer_data_type, MeasurementValue};

// POINT(11.35 46.5), little-endian WKB and EWKB with SRID 4326
const POINT_WKB_HEX: &str = "01010000003333333333b326400000000000404740";
const POINT_EWKB_HEX: &str = "0101000020e61000003333333333b326400000000000404740";

#[test]
fn decode_numeric_with_fallthrough() {
    assert_eq!(
        decode_value("22.5", DataType::Numeric),
        MeasurementValue::Numeric(22.5)
    );
    assert_eq!(
        decode_value("not-a-number", DataType::Numeric),
        MeasurementValue::Text("not-a-number".to_string())
    );
}

#[test]
fn decode_boolean_with_fallthrough() {
    assert_eq!(
        decode_value("true", DataType::Boolean),
        MeasurementValue::Boolean(true)
    );
    assert_eq!(
        decode_value("0", DataType::Boolean),
        MeasurementValue::Boolean(false)
    );
    assert_eq!(
        decode_value("maybe", DataType::Boolean),
        MeasurementValue::Text("maybe".to_string())
    );
}

#[test]
fn decode_json_with_fallthrough() {
    assert_eq!(
        decode_value("{\"depth\":12}", DataType::Json),
        MeasurementValue::Json(json!({"depth": 12}))
    );
    assert_eq!(
        decode_value("{broken", DataType::Json),
        MeasurementValue::Text("{broken".to_string())
    );
}

#[test]
fn decode_geometry_from_hex_wkb() {
    for hex in [POINT_WKB_HEX, POINT_EWKB_HEX] {
        let MeasurementValue::Wkt(text) = decode_value(hex, DataType::Geoposition) else {
            panic!("expected WKT value");
        };
        assert!(text.starts_with("POINT"), "got {text}");
        assert!(text.contains("11.35"), "got {text}");
        assert!(text.contains("46.5"), "got {text}");
    }
}

#[test]
fn decode_geometry_passes_wkt_through() {
    assert_eq!(
        decode_value("POINT(11.35 46.5)", DataType::Geoposition),
        MeasurementValue::Wkt("POINT(11.35 46.5)".to_string())
    );
}

#[test]
fn infer_data_type_dispatch() {
    assert_eq!(infer_data_type(&json!(true)), DataType::Boolean);
    assert_eq!(infer_data_type(&json!(22.5)), DataType::Numeric);
    assert_eq!(infer_data_type(&json!("warm")), DataType::String);
    assert_eq!(infer_data_type(&json!({"a": 1})), DataType::Json);
    assert_eq!(infer_data_type(&json!([1, 2])), DataType::Json);
    assert_eq!(
        infer_data_type(&json!({"type": "Point", "coordinates": [11.35, 46.5]})),
        DataType::Geoposition
    );
    assert_eq!(
        infer_data_type(
            &json!({"type": "Polygon", "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]]})
        ),
        DataType::Geoshape
    );
}

#[test]
fn encode_numeric_accepts_numbers_and_numeric_strings() {
    assert_eq!(
        encode_value(&json!(3.5), DataType::Numeric).unwrap(),
        MeasurementValue::Numeric(3.5)
    );
    assert_eq!(
        encode_value(&json!("3.5"), DataType::Numeric).unwrap(),
        MeasurementValue::Numeric(3.5)
    );
}

#[test]
fn encode_boolean_accepts_token_forms() {
    for token in ["true", "1", "yes"] {
        assert_eq!(
            encode_value(&json!(token), DataType::Boolean).unwrap(),
            MeasurementValue::Boolean(true)
        );
    }
    assert_eq!(
        encode_value(&json!("no"), DataType::Boolean).unwrap(),
        MeasurementValue::Boolean(false)
    );
    assert_eq!(
        encode_value(&json!(false), DataType::Boolean).unwrap(),
        MeasurementValue::Boolean(false)
    );
}

#[test]
fn encode_geoposition_from_geojson_point() {
    let value = json!({"type": "Point", "coordinates": [11.35, 46.5]});
    let MeasurementValue::Wkt(text) = encode_value(&value, DataType::Geoposition).unwrap() else {
        panic!("expected WKT value");
    };
    assert!(text.starts_with("POINT"), "got {text}");

    // A polygon is not a valid geoposition
    let polygon = json!({"type": "Polygon", "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]]});
    assert!(encode_value(&polygon, DataType::Geoposition).is_err());
}

#[test]
fn encode_geoshape_from_geojson_polygon() {
    let value = json!({"type": "Polygon", "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]]});
    let MeasurementValue::Wkt(text) = encode_value(&value, DataType::Geoshape).unwrap() else {
        panic!("expected WKT value");
    };
    assert!(text.starts_with("POLYGON"), "got {text}");

    assert!(encode_value(&json!({"type": "Point", "coordinates": [1.0, 2.0]}), DataType::Geoshape)
        .is_err());
}

#[test]
fn encode_string_serializes_structured_values() {
    assert_eq!(
        encode_value(&json!("plain"), DataType::String).unwrap(),
        MeasurementValue::Text("plain".to_string())
    );
    assert_eq!(
        encode_value(&json!({"a": 1}), DataType::String).unwrap(),
        MeasurementValue::Text("{\"a\":1}".to_string())
    );
}
