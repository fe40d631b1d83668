use axum::{
    extract::{Path, Query, State},
    Json,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::common::AppState;
use crate::entity::{sensors, timeseries, types, DataType};
use crate::error::{AppError, AppResult};
use crate::filter::{DiscoveryRequest, VerifyRequest, VerifyResponse};
use crate::routes::measurements::parse_comma_separated;
use crate::services::discovery;

#[derive(Debug, Serialize, ToSchema)]
pub struct TimeseriesInfo {
    pub timeseries_id: Uuid,
    pub type_name: String,
    pub data_type: DataType,
    pub unit: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SensorTimeseriesResponse {
    pub sensor: sensors::Model,
    pub timeseries: Vec<TimeseriesInfo>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SensorTimeseriesQuery {
    /// Comma-separated type names to filter by
    pub type_names: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchSensorTimeseriesRequest {
    pub sensor_names: Vec<String>,
    #[serde(default)]
    pub type_names: Vec<String>,
}

/// Discover sensors
///
/// Find sensors whose timeseries satisfy structural (type/dataset) and
/// measurement-value predicates.
#[utoipa::path(
    post,
    path = "/api/v1/sensors",
    request_body = DiscoveryRequest,
    responses(
        (status = 200, description = "Matching sensors, ordered by name"),
        (status = 400, description = "Invalid filter expression"),
    ),
    tag = "sensors"
)]
pub async fn discover_sensors(
    State(state): State<AppState>,
    Json(req): Json<DiscoveryRequest>,
) -> AppResult<Json<JsonValue>> {
    tracing::info!(
        timeseries_filter = req.timeseries_filter.is_some(),
        measurement_filter = req.measurement_filter.is_some(),
        limit = req.limit,
        "Processing sensor discovery request"
    );

    let sensors = discovery::discover(&state, &req).await?;
    let count = sensors.len();
    Ok(Json(json!({
        "sensors": sensors,
        "count": count,
    })))
}

/// Verify sensors against discovery filters
///
/// Partitions the given sensor names by membership in the filtered set.
#[utoipa::path(
    post,
    path = "/api/v1/sensors/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification result", body = VerifyResponse),
        (status = 400, description = "Invalid request"),
    ),
    tag = "sensors"
)]
pub async fn verify_sensors(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> AppResult<Json<VerifyResponse>> {
    if req.sensor_names.is_empty() {
        return Err(AppError::Validation(
            "sensor_names list cannot be empty".to_string(),
        ));
    }

    let response = discovery::verify(&state, &req).await?;
    tracing::info!(
        ok = response.ok,
        verified = response.verified.len(),
        unverified = response.unverified.len(),
        "Sensor verification completed"
    );
    Ok(Json(response))
}

/// Get the timeseries of one sensor
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{name}",
    params(
        ("name" = String, Path, description = "Sensor name"),
        SensorTimeseriesQuery
    ),
    responses(
        (status = 200, description = "Sensor with its timeseries", body = SensorTimeseriesResponse),
        (status = 404, description = "Sensor not found"),
    ),
    tag = "sensors"
)]
pub async fn sensor_timeseries(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<SensorTimeseriesQuery>,
) -> AppResult<Json<SensorTimeseriesResponse>> {
    let type_names = params
        .type_names
        .as_deref()
        .map(parse_comma_separated)
        .unwrap_or_default();

    let response = sensor_with_timeseries(&state, &name, &type_names)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sensor '{name}' not found")))?;
    Ok(Json(response))
}

/// Get timeseries for a batch of sensors
#[utoipa::path(
    post,
    path = "/api/v1/sensors/timeseries",
    request_body = BatchSensorTimeseriesRequest,
    responses(
        (status = 200, description = "Sensors with their timeseries"),
        (status = 400, description = "Invalid request"),
    ),
    tag = "sensors"
)]
pub async fn batch_sensor_timeseries(
    State(state): State<AppState>,
    Json(req): Json<BatchSensorTimeseriesRequest>,
) -> AppResult<Json<JsonValue>> {
    if req.sensor_names.is_empty() {
        return Err(AppError::Validation(
            "sensor_names array cannot be empty".to_string(),
        ));
    }

    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in &req.sensor_names {
        match sensor_with_timeseries(&state, name, &req.type_names).await? {
            Some(entry) => found.push(entry),
            None => missing.push(name.clone()),
        }
    }

    let count = found.len();
    Ok(Json(json!({
        "sensors": found,
        "count": count,
        "missing": missing,
    })))
}

async fn sensor_with_timeseries(
    state: &AppState,
    name: &str,
    type_names: &[String],
) -> AppResult<Option<SensorTimeseriesResponse>> {
    let Some(sensor) = sensors::Entity::find()
        .filter(sensors::Column::Name.eq(name))
        .one(&state.db)
        .await?
    else {
        return Ok(None);
    };

    let mut query = timeseries::Entity::find()
        .find_also_related(types::Entity)
        .filter(timeseries::Column::SensorId.eq(sensor.id));
    if !type_names.is_empty() {
        query = query.filter(types::Column::Name.is_in(type_names.iter().cloned()));
    }

    let rows = query.order_by_asc(types::Column::Name).all(&state.db).await?;

    let timeseries = rows
        .into_iter()
        .filter_map(|(ts, type_record)| {
            type_record.map(|t| TimeseriesInfo {
                timeseries_id: ts.id,
                type_name: t.name,
                data_type: t.data_type,
                unit: t.unit,
            })
        })
        .collect();

    Ok(Some(SensorTimeseriesResponse { sensor, timeseries }))
}
