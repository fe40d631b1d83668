use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use utoipa::{IntoParams, ToSchema};

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::services::ingest::{self, BatchDataRequest, DeleteMeasurementsRequest};
use crate::services::query;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LatestMeasurementsRequest {
    pub sensor_names: Vec<String>,
    #[serde(default)]
    pub type_names: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoricalMeasurementsRequest {
    pub sensor_names: Vec<String>,
    #[serde(default)]
    pub type_names: Vec<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LatestQuery {
    /// Comma-separated sensor names
    pub sensor_names: String,
    /// Comma-separated type names
    pub type_names: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoricalQuery {
    /// Comma-separated sensor names
    pub sensor_names: String,
    /// Comma-separated type names
    pub type_names: Option<String>,
    /// Start time (RFC 3339)
    pub start_time: Option<DateTime<Utc>>,
    /// End time (RFC 3339)
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of results per datatype
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteOutcome {
    pub deleted: u64,
}

pub(crate) fn parse_comma_separated(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Batch insert measurements
///
/// Sensors, types and timeseries referenced by name are created on demand;
/// duplicate (timeseries, timestamp) pairs are silently coalesced.
#[utoipa::path(
    post,
    path = "/api/v1/measurements/batch",
    request_body = BatchDataRequest,
    responses(
        (status = 200, description = "Batch processed"),
        (status = 400, description = "Invalid request"),
    ),
    tag = "measurements"
)]
pub async fn batch_insert(
    State(state): State<AppState>,
    Json(req): Json<BatchDataRequest>,
) -> AppResult<Json<JsonValue>> {
    let outcome = ingest::batch_insert(&state, &req).await?;
    Ok(Json(json!({
        "processed": outcome.processed,
        "total": req.measurements.len(),
    })))
}

/// Delete measurements by predicate
///
/// At least one of sensor names, type names, start or end time is required.
#[utoipa::path(
    delete,
    path = "/api/v1/measurements",
    request_body = DeleteMeasurementsRequest,
    responses(
        (status = 200, description = "Measurements deleted", body = DeleteOutcome),
        (status = 400, description = "No filter provided"),
    ),
    tag = "measurements"
)]
pub async fn delete_measurements(
    State(state): State<AppState>,
    Json(req): Json<DeleteMeasurementsRequest>,
) -> AppResult<Json<DeleteOutcome>> {
    let deleted = ingest::delete_measurements(&state, &req).await?;
    Ok(Json(DeleteOutcome { deleted }))
}

/// Get latest measurements (JSON body)
#[utoipa::path(
    post,
    path = "/api/v1/measurements/latest",
    request_body = LatestMeasurementsRequest,
    responses(
        (status = 200, description = "Latest measurement per timeseries"),
        (status = 400, description = "Invalid request"),
    ),
    tag = "measurements"
)]
pub async fn latest_measurements(
    State(state): State<AppState>,
    Json(req): Json<LatestMeasurementsRequest>,
) -> AppResult<Json<JsonValue>> {
    if req.sensor_names.is_empty() {
        return Err(AppError::Validation(
            "at least one sensor name must be provided".to_string(),
        ));
    }

    let measurements =
        query::latest_measurements(&state, &req.sensor_names, &req.type_names).await?;
    let count = measurements.len();
    Ok(Json(json!({
        "measurements": measurements,
        "count": count,
    })))
}

/// Get latest measurements (query params)
#[utoipa::path(
    get,
    path = "/api/v1/measurements/latest",
    params(LatestQuery),
    responses(
        (status = 200, description = "Latest measurement per timeseries"),
        (status = 400, description = "Invalid request"),
    ),
    tag = "measurements"
)]
pub async fn latest_measurements_query(
    State(state): State<AppState>,
    Query(params): Query<LatestQuery>,
) -> AppResult<Json<JsonValue>> {
    let sensor_names = parse_comma_separated(&params.sensor_names);
    if sensor_names.is_empty() {
        return Err(AppError::Validation(
            "sensor_names parameter is required".to_string(),
        ));
    }
    let type_names = params
        .type_names
        .as_deref()
        .map(parse_comma_separated)
        .unwrap_or_default();

    let measurements = query::latest_measurements(&state, &sensor_names, &type_names).await?;
    let count = measurements.len();
    Ok(Json(json!({
        "measurements": measurements,
        "count": count,
    })))
}

/// Get historical measurements (JSON body)
#[utoipa::path(
    post,
    path = "/api/v1/measurements/historical",
    request_body = HistoricalMeasurementsRequest,
    responses(
        (status = 200, description = "Historical measurements, newest first per datatype"),
        (status = 400, description = "Invalid request"),
    ),
    tag = "measurements"
)]
pub async fn historical_measurements(
    State(state): State<AppState>,
    Json(req): Json<HistoricalMeasurementsRequest>,
) -> AppResult<Json<JsonValue>> {
    if req.sensor_names.is_empty() {
        return Err(AppError::Validation(
            "at least one sensor name must be provided".to_string(),
        ));
    }

    let measurements = query::historical_measurements(
        &state,
        &req.sensor_names,
        &req.type_names,
        req.start_time,
        req.end_time,
        req.limit,
    )
    .await?;
    let count = measurements.len();
    Ok(Json(json!({
        "measurements": measurements,
        "count": count,
    })))
}

/// Get historical measurements (query params)
#[utoipa::path(
    get,
    path = "/api/v1/measurements/historical",
    params(HistoricalQuery),
    responses(
        (status = 200, description = "Historical measurements, newest first per datatype"),
        (status = 400, description = "Invalid request"),
    ),
    tag = "measurements"
)]
pub async fn historical_measurements_query(
    State(state): State<AppState>,
    Query(params): Query<HistoricalQuery>,
) -> AppResult<Json<JsonValue>> {
    let sensor_names = parse_comma_separated(&params.sensor_names);
    if sensor_names.is_empty() {
        return Err(AppError::Validation(
            "sensor_names parameter is required".to_string(),
        ));
    }
    let type_names = params
        .type_names
        .as_deref()
        .map(parse_comma_separated)
        .unwrap_or_default();

    let measurements = query::historical_measurements(
        &state,
        &sensor_names,
        &type_names,
        params.start_time,
        params.end_time,
        params.limit,
    )
    .await?;
    let count = measurements.len();
    Ok(Json(json!({
        "measurements": measurements,
        "count": count,
    })))
}
