//! Historical and latest-measurement queries.
//!
//! Each of the six datatype tables is scanned with its own SELECT joined to
//! the sensor graph; results are concatenated. Order is timestamp-descending
//! within a datatype; no global order is guaranteed across datatypes.

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement, Value};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::entity::types::ALL_DATA_TYPES;
use crate::entity::DataType;
use crate::error::AppResult;
use crate::services::codec::{self, MeasurementValue};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeasurementRecord {
    pub timeseries_id: Uuid,
    pub sensor_name: String,
    pub type_name: String,
    pub data_type: DataType,
    pub timestamp: DateTime<Utc>,
    pub value: MeasurementValue,
}

/// Latest measurement per timeseries for the given sensors.
pub async fn latest_measurements(
    state: &AppState,
    sensor_names: &[String],
    type_names: &[String],
) -> AppResult<Vec<MeasurementRecord>> {
    fetch_measurements(state, sensor_names, type_names, None, None, None, true).await
}

/// Time-ordered history for the given sensors, newest first per datatype.
pub async fn historical_measurements(
    state: &AppState,
    sensor_names: &[String],
    type_names: &[String],
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    limit: Option<u64>,
) -> AppResult<Vec<MeasurementRecord>> {
    fetch_measurements(state, sensor_names, type_names, start_time, end_time, limit, false).await
}

#[allow(clippy::too_many_arguments)]
async fn fetch_measurements(
    state: &AppState,
    sensor_names: &[String],
    type_names: &[String],
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    limit: Option<u64>,
    latest: bool,
) -> AppResult<Vec<MeasurementRecord>> {
    let mut results = Vec::new();

    for data_type in ALL_DATA_TYPES {
        let mut values: Vec<Value> = Vec::new();

        let value_select = if data_type.is_geometry() {
            "ST_AsText(m.value) AS value"
        } else {
            "m.value::text AS value"
        };

        let mut time_conditions = String::new();
        if let Some(start) = start_time {
            values.push(start.into());
            time_conditions.push_str(&format!(" AND m.timestamp >= ${}", values.len()));
        }
        if let Some(end) = end_time {
            values.push(end.into());
            time_conditions.push_str(&format!(" AND m.timestamp <= ${}", values.len()));
        }

        let sql = if latest {
            let name_conditions = name_conditions(sensor_names, type_names, &mut values);
            format!(
                "SELECT ts.id AS timeseries_id, s.name AS sensor_name, t.name AS type_name, \
                 m.timestamp, {value_select} \
                 FROM (SELECT m.*, \
                 ROW_NUMBER() OVER (PARTITION BY m.timeseries_id ORDER BY m.timestamp DESC) AS rn \
                 FROM {table} m WHERE 1=1{time_conditions}) m \
                 JOIN timeseries ts ON m.timeseries_id = ts.id \
                 JOIN sensors s ON ts.sensor_id = s.id \
                 JOIN \"types\" t ON ts.type_id = t.id \
                 WHERE m.rn = 1{name_conditions} \
                 ORDER BY m.timestamp DESC",
                table = data_type.measurement_table(),
            )
        } else {
            let name_conditions = name_conditions(sensor_names, type_names, &mut values);
            let limit_clause = match limit {
                Some(limit) if limit > 0 => {
                    values.push((limit as i64).into());
                    format!(" LIMIT ${}", values.len())
                }
                _ => String::new(),
            };
            format!(
                "SELECT ts.id AS timeseries_id, s.name AS sensor_name, t.name AS type_name, \
                 m.timestamp, {value_select} \
                 FROM {table} m \
                 JOIN timeseries ts ON m.timeseries_id = ts.id \
                 JOIN sensors s ON ts.sensor_id = s.id \
                 JOIN \"types\" t ON ts.type_id = t.id \
                 WHERE 1=1{name_conditions}{time_conditions} \
                 ORDER BY m.timestamp DESC{limit_clause}",
                table = data_type.measurement_table(),
            )
        };

        let rows = state
            .db
            .query_all(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                values,
            ))
            .await?;

        for row in rows {
            let raw: String = row.try_get("", "value")?;
            results.push(MeasurementRecord {
                timeseries_id: row.try_get("", "timeseries_id")?,
                sensor_name: row.try_get("", "sensor_name")?,
                type_name: row.try_get("", "type_name")?,
                data_type: *data_type,
                timestamp: row.try_get("", "timestamp")?,
                value: codec::decode_value(&raw, *data_type),
            });
        }
    }

    Ok(results)
}

fn name_conditions(
    sensor_names: &[String],
    type_names: &[String],
    values: &mut Vec<Value>,
) -> String {
    let mut clause = String::new();

    if !sensor_names.is_empty() {
        let placeholders: Vec<String> = sensor_names
            .iter()
            .map(|name| {
                values.push(name.clone().into());
                format!("${}", values.len())
            })
            .collect();
        clause.push_str(&format!(" AND s.name IN ({})", placeholders.join(",")));
    }

    if !type_names.is_empty() {
        let placeholders: Vec<String> = type_names
            .iter()
            .map(|name| {
                values.push(name.clone().into());
                format!("${}", values.len())
            })
            .collect();
        clause.push_str(&format!(" AND t.name IN ({})", placeholders.join(",")));
    }

    clause
}
