//! Batch ingestion and predicate deletion.
//!
//! Sensors, types, timeseries and provenance are get-or-create on first
//! mention; measurements are grouped by resolved datatype and inserted in
//! chunks with duplicate (timeseries, timestamp) pairs silently coalesced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, QueryFilter,
    Set, Statement, Value,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::entity::types::ALL_DATA_TYPES;
use crate::entity::{provenance, sensors, timeseries, types, DataType};
use crate::error::{AppError, AppResult};
use crate::services::codec::{self, MeasurementValue};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProvenanceInput {
    pub lineage: String,
    pub data_collector: String,
    #[serde(default)]
    pub data_collector_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MeasurementInput {
    pub sensor_name: String,
    pub type_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: JsonValue,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchDataRequest {
    #[serde(default)]
    pub provenance: Option<ProvenanceInput>,
    pub measurements: Vec<MeasurementInput>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DeleteMeasurementsRequest {
    #[serde(default)]
    pub sensor_names: Vec<String>,
    #[serde(default)]
    pub type_names: Vec<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchInsertOutcome {
    pub processed: usize,
}

struct PendingMeasurement {
    timeseries_id: Uuid,
    timestamp: DateTime<Utc>,
    value: MeasurementValue,
    provenance_id: Option<i64>,
}

/// Ingest a batch of measurements.
///
/// Entities referenced by name are created on demand; the datatype of an
/// existing type always wins over the one inferred from the incoming value.
pub async fn batch_insert(state: &AppState, req: &BatchDataRequest) -> AppResult<BatchInsertOutcome> {
    if req.measurements.is_empty() {
        return Err(AppError::Validation("no measurements provided".to_string()));
    }

    let provenance_id = match &req.provenance {
        Some(p) => Some(get_or_create_provenance(state, p).await?.id),
        None => None,
    };

    // Request-local lookup maps avoid re-resolving repeated names.
    let mut sensor_ids: HashMap<String, i64> = HashMap::new();
    let mut type_records: HashMap<String, types::Model> = HashMap::new();
    let mut timeseries_ids: HashMap<(i64, i64), Uuid> = HashMap::new();
    let mut by_data_type: HashMap<DataType, Vec<PendingMeasurement>> = HashMap::new();

    for input in &req.measurements {
        let sensor_id = match sensor_ids.get(&input.sensor_name) {
            Some(id) => *id,
            None => {
                let sensor = get_or_create_sensor(state, &input.sensor_name).await?;
                sensor_ids.insert(input.sensor_name.clone(), sensor.id);
                sensor.id
            }
        };

        let type_record = match type_records.get(&input.type_name) {
            Some(t) => t.clone(),
            None => {
                let inferred = codec::infer_data_type(&input.value);
                let record = get_or_create_type(state, &input.type_name, inferred).await?;
                type_records.insert(input.type_name.clone(), record.clone());
                record
            }
        };
        let data_type = type_record.data_type;

        let timeseries_id = match timeseries_ids.get(&(sensor_id, type_record.id)) {
            Some(id) => *id,
            None => {
                let ts = get_or_create_timeseries(state, sensor_id, type_record.id).await?;
                timeseries_ids.insert((sensor_id, type_record.id), ts.id);
                ts.id
            }
        };

        let value = codec::encode_value(&input.value, data_type)?;
        by_data_type
            .entry(data_type)
            .or_default()
            .push(PendingMeasurement {
                timeseries_id,
                timestamp: input.timestamp,
                value,
                provenance_id,
            });
    }

    let batch_size = state.config.insert_batch_size.max(1);
    for (data_type, pending) in &by_data_type {
        for chunk in pending.chunks(batch_size) {
            insert_chunk(state, *data_type, chunk).await?;
        }
    }

    tracing::info!(
        measurements = req.measurements.len(),
        sensors = sensor_ids.len(),
        types = type_records.len(),
        "Batch insert completed"
    );

    Ok(BatchInsertOutcome {
        processed: req.measurements.len(),
    })
}

async fn insert_chunk(
    state: &AppState,
    data_type: DataType,
    chunk: &[PendingMeasurement],
) -> AppResult<()> {
    let mut rows: Vec<String> = Vec::with_capacity(chunk.len());
    let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 4);

    for m in chunk {
        let base = values.len();
        values.push(m.timeseries_id.into());
        values.push(m.timestamp.into());
        values.push(measurement_param(&m.value));
        values.push(m.provenance_id.into());

        // Geometry values arrive as WKT and go through ST_GeomFromText.
        let value_expr = if data_type.is_geometry() {
            format!("ST_GeomFromText(${}, 4326)", base + 3)
        } else {
            format!("${}", base + 3)
        };
        rows.push(format!(
            "(${}, ${}, {value_expr}, ${})",
            base + 1,
            base + 2,
            base + 4
        ));
    }

    let sql = format!(
        "INSERT INTO {} (timeseries_id, timestamp, value, provenance_id) VALUES {} \
         ON CONFLICT (timeseries_id, timestamp) DO NOTHING",
        data_type.measurement_table(),
        rows.join(", ")
    );

    state
        .db
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            values,
        ))
        .await?;
    Ok(())
}

fn measurement_param(value: &MeasurementValue) -> Value {
    match value {
        MeasurementValue::Numeric(n) => (*n).into(),
        MeasurementValue::Boolean(b) => (*b).into(),
        MeasurementValue::Text(s) | MeasurementValue::Wkt(s) => s.clone().into(),
        MeasurementValue::Json(v) => Value::Json(Some(Box::new(v.clone()))),
    }
}

/// Delete measurements matching the request's predicate across every
/// datatype table.
///
/// # Errors
///
/// Returns a validation error when no filter dimension is present; an
/// unfiltered delete would truncate every measurement table.
pub async fn delete_measurements(
    state: &AppState,
    req: &DeleteMeasurementsRequest,
) -> AppResult<u64> {
    if req.sensor_names.is_empty()
        && req.type_names.is_empty()
        && req.start_time.is_none()
        && req.end_time.is_none()
    {
        return Err(AppError::Validation(
            "at least one filter must be provided".to_string(),
        ));
    }

    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if !req.sensor_names.is_empty() {
        let placeholders: Vec<String> = req
            .sensor_names
            .iter()
            .map(|name| {
                values.push(name.clone().into());
                format!("${}", values.len())
            })
            .collect();
        conditions.push(format!("s.name IN ({})", placeholders.join(",")));
    }

    if !req.type_names.is_empty() {
        let placeholders: Vec<String> = req
            .type_names
            .iter()
            .map(|name| {
                values.push(name.clone().into());
                format!("${}", values.len())
            })
            .collect();
        conditions.push(format!("t.name IN ({})", placeholders.join(",")));
    }

    if let Some(start) = req.start_time {
        values.push(start.into());
        conditions.push(format!("m.timestamp >= ${}", values.len()));
    }
    if let Some(end) = req.end_time {
        values.push(end.into());
        conditions.push(format!("m.timestamp <= ${}", values.len()));
    }

    let mut deleted = 0u64;
    for data_type in ALL_DATA_TYPES {
        let sql = format!(
            "DELETE FROM {} m USING timeseries ts, sensors s, \"types\" t \
             WHERE m.timeseries_id = ts.id AND ts.sensor_id = s.id AND ts.type_id = t.id \
             AND {}",
            data_type.measurement_table(),
            conditions.join(" AND ")
        );

        let result = state
            .db
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                values.clone(),
            ))
            .await?;
        deleted += result.rows_affected();
    }

    tracing::info!(deleted, "Deleted measurements by predicate");
    Ok(deleted)
}

async fn get_or_create_provenance(
    state: &AppState,
    input: &ProvenanceInput,
) -> AppResult<provenance::Model> {
    let mut query = provenance::Entity::find()
        .filter(provenance::Column::Lineage.eq(&input.lineage))
        .filter(provenance::Column::DataCollector.eq(&input.data_collector));
    query = match &input.data_collector_version {
        Some(version) => query.filter(provenance::Column::DataCollectorVersion.eq(version)),
        None => query.filter(provenance::Column::DataCollectorVersion.is_null()),
    };

    if let Some(existing) = query.one(&state.db).await? {
        return Ok(existing);
    }

    let model = provenance::ActiveModel {
        uuid: Set(Uuid::new_v4()),
        lineage: Set(input.lineage.clone()),
        data_collector: Set(input.data_collector.clone()),
        data_collector_version: Set(input.data_collector_version.clone()),
        ..Default::default()
    };
    Ok(model.insert(&state.db).await?)
}

async fn get_or_create_sensor(state: &AppState, name: &str) -> AppResult<sensors::Model> {
    if let Some(existing) = sensors::Entity::find()
        .filter(sensors::Column::Name.eq(name))
        .one(&state.db)
        .await?
    {
        return Ok(existing);
    }

    let model = sensors::ActiveModel {
        name: Set(name.to_string()),
        metadata: Set(Some(serde_json::json!({}))),
        created_on: Set(Utc::now().into()),
        is_active: Set(true),
        is_available: Set(true),
        ..Default::default()
    };
    let created = model.insert(&state.db).await?;
    tracing::debug!(name, id = created.id, "Created sensor");
    Ok(created)
}

async fn get_or_create_type(
    state: &AppState,
    name: &str,
    data_type: DataType,
) -> AppResult<types::Model> {
    if let Some(existing) = types::Entity::find()
        .filter(types::Column::Name.eq(name))
        .one(&state.db)
        .await?
    {
        return Ok(existing);
    }

    let model = types::ActiveModel {
        name: Set(name.to_string()),
        data_type: Set(data_type),
        metadata: Set(Some(serde_json::json!({}))),
        ..Default::default()
    };
    let created = model.insert(&state.db).await?;
    tracing::debug!(name, data_type = %data_type.as_str(), "Created type");
    Ok(created)
}

async fn get_or_create_timeseries(
    state: &AppState,
    sensor_id: i64,
    type_id: i64,
) -> AppResult<timeseries::Model> {
    if let Some(existing) = timeseries::Entity::find()
        .filter(timeseries::Column::SensorId.eq(sensor_id))
        .filter(timeseries::Column::TypeId.eq(type_id))
        .one(&state.db)
        .await?
    {
        return Ok(existing);
    }

    let model = timeseries::ActiveModel {
        id: Set(Uuid::new_v4()),
        sensor_id: Set(sensor_id),
        type_id: Set(type_id),
        created_on: Set(Utc::now().into()),
    };
    Ok(model.insert(&state.db).await?)
}
