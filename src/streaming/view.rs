//! Cursor subscriptions against the streaming sidecar's materialized views.
//!
//! A subscription is partitioned per datatype: each partition declares its
//! own `SUBSCRIBE` cursor over `latest_measurements_<datatype>` inside its
//! own transaction and pumps fetched rows into the shared update channel.
//! Rows carry an `mz_diff` column; retractions (diff != 1) are dropped so
//! subscribers only ever observe insertions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::prelude::Decimal;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, QueryResult,
    Statement, TransactionTrait,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::entity::types::ALL_DATA_TYPES;
use crate::entity::{dataset_types, datasets, types, DataType};
use crate::error::{AppError, AppResult};
use crate::filter::{TimeRange, ValueCondition};
use crate::services::discovery::{render_predicate, CompiledQuery, Params};

/// Buffered capacity of the per-subscriber update channel.
pub const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Idle sleep between empty cursor fetches.
const FETCH_IDLE_SLEEP: Duration = Duration::from_millis(100);

/// A live measurement update delivered to a subscriber.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeasurementUpdate {
    pub timeseries_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub value: crate::services::codec::MeasurementValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance_id: Option<i64>,
    pub created_on: DateTime<Utc>,
    pub sensor_id: i64,
    pub type_id: i64,
    pub sensor_name: String,
    pub type_name: String,
    pub data_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_metadata: Option<JsonValue>,
}

/// Everything a subscription pushes down into its cursor queries.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSpec {
    pub sensor_names: Vec<String>,
    /// Restricts streamed rows to these type names; empty means unrestricted.
    pub type_names: Vec<String>,
    /// Non-spatial value conditions from the measurement expression.
    pub conditions: Vec<ValueCondition>,
    pub time_range: Option<TimeRange>,
    pub skip_initial_snapshot: bool,
}

/// Resolve the type names composing the given datasets.
pub async fn dataset_type_names(
    state: &AppState,
    dataset_names: &[String],
) -> AppResult<Vec<String>> {
    use sea_orm::{ColumnTrait, EntityTrait, JoinType, QueryFilter, QuerySelect, RelationTrait};

    let rows: Vec<(dataset_types::Model, Option<types::Model>)> = dataset_types::Entity::find()
        .find_also_related(types::Entity)
        .join(JoinType::InnerJoin, dataset_types::Relation::Dataset.def())
        .filter(datasets::Column::Name.is_in(dataset_names.iter().cloned()))
        .all(&state.db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(_, t)| t.map(|t| t.name))
        .collect())
}

/// Partition datatypes for the subscription: the datatypes of every
/// referenced type name, or all six when nothing constrains them.
#[must_use]
pub fn partition_data_types(data_types: &HashMap<String, DataType>) -> Vec<DataType> {
    if data_types.is_empty() {
        return ALL_DATA_TYPES.to_vec();
    }
    let mut partitions: Vec<DataType> = Vec::new();
    for dt in data_types.values() {
        if !partitions.contains(dt) {
            partitions.push(*dt);
        }
    }
    partitions
}

/// Compile the cursor declaration for one datatype partition.
///
/// Value conditions apply only to rows of their own type: a row of another
/// type is unaffected by them, hence the `type_name <> $n OR ...` shape.
pub fn compile_subscribe(
    data_type: DataType,
    spec: &SubscriptionSpec,
    data_types: &HashMap<String, DataType>,
    snapshot_clause: bool,
) -> AppResult<CompiledQuery> {
    let mut params = Params::default();
    let mut sql = format!(
        "DECLARE c CURSOR FOR SUBSCRIBE TO (SELECT timeseries_id, timestamp, value, \
         provenance_id, created_on, sensor_id, type_id, sensor_name, type_name, \
         data_type, unit, sensor_metadata FROM {} m WHERE 1=1",
        data_type.streaming_view()
    );

    if !spec.sensor_names.is_empty() {
        let placeholders: Vec<String> = spec
            .sensor_names
            .iter()
            .map(|name| params.bind(name.clone()))
            .collect();
        sql.push_str(&format!(" AND sensor_name IN ({})", placeholders.join(",")));
    }

    if !spec.type_names.is_empty() {
        let placeholders: Vec<String> = spec
            .type_names
            .iter()
            .map(|name| params.bind(name.clone()))
            .collect();
        sql.push_str(&format!(" AND type_name IN ({})", placeholders.join(",")));
    }

    if let Some(range) = &spec.time_range {
        if let Some(start) = range.start_time {
            let p = params.bind(start);
            sql.push_str(&format!(" AND timestamp >= {p}"));
        }
        if let Some(end) = range.end_time {
            let p = params.bind(end);
            sql.push_str(&format!(" AND timestamp <= {p}"));
        }
    }

    for condition in &spec.conditions {
        if data_types.get(&condition.type_name) != Some(&data_type) {
            continue;
        }
        let type_param = params.bind(condition.type_name.clone());
        let predicate = render_predicate(condition, "m", &mut params)?;
        sql.push_str(&format!(" AND (type_name <> {type_param} OR {predicate})"));
    }

    sql.push(')');
    if spec.skip_initial_snapshot && snapshot_clause {
        sql.push_str(" WITH (SNAPSHOT = false)");
    }

    Ok(CompiledQuery {
        sql,
        values: params.values,
    })
}

/// Spawn one cursor partition task per datatype, all feeding `tx`.
pub fn spawn_partitions(
    state: &AppState,
    spec: &SubscriptionSpec,
    data_types: &HashMap<String, DataType>,
    tx: &mpsc::Sender<MeasurementUpdate>,
    token: &CancellationToken,
) -> AppResult<()> {
    let db = state
        .streaming_db
        .clone()
        .ok_or_else(|| AppError::ServiceUnavailable("streaming source not configured".to_string()))?;

    // The native clause skips the snapshot at the source; without it, the
    // partition falls back to dropping rows at the initial watermark.
    let snapshot_clause = state.config.streaming_snapshot_clause;
    let simulate_watermark = spec.skip_initial_snapshot && !snapshot_clause;

    for data_type in partition_data_types(data_types) {
        let compiled = compile_subscribe(data_type, spec, data_types, snapshot_clause)?;
        tracing::debug!(
            data_type = %data_type.as_str(),
            sql = %compiled.sql,
            "Declaring streaming cursor"
        );
        tokio::spawn(run_partition(
            db.clone(),
            data_type,
            compiled,
            simulate_watermark,
            tx.clone(),
            token.clone(),
        ));
    }

    Ok(())
}

async fn run_partition(
    db: DatabaseConnection,
    data_type: DataType,
    compiled: CompiledQuery,
    simulate_watermark: bool,
    tx: mpsc::Sender<MeasurementUpdate>,
    token: CancellationToken,
) {
    let result = partition_loop(&db, data_type, compiled, simulate_watermark, &tx, &token).await;

    if let Err(e) = result {
        if !token.is_cancelled() {
            tracing::error!(
                data_type = %data_type.as_str(),
                error = %e,
                "Streaming partition failed, cancelling subscription"
            );
        }
    }
    // A partition never outlives its cursor; any exit tears the whole
    // subscription down.
    token.cancel();
}

async fn partition_loop(
    db: &DatabaseConnection,
    data_type: DataType,
    compiled: CompiledQuery,
    simulate_watermark: bool,
    tx: &mpsc::Sender<MeasurementUpdate>,
    token: &CancellationToken,
) -> AppResult<()> {
    let txn = db.begin().await?;

    let result = cursor_loop(&txn, data_type, compiled, simulate_watermark, tx, token)
        .await
        .map_err(|e| AppError::Streaming(e.to_string()));

    // Closing the cursor is a rollback; it must run on every exit path.
    if let Err(e) = txn.rollback().await {
        tracing::warn!(error = %e, "Failed to roll back streaming cursor transaction");
    }
    result
}

async fn cursor_loop(
    txn: &DatabaseTransaction,
    data_type: DataType,
    compiled: CompiledQuery,
    simulate_watermark: bool,
    tx: &mpsc::Sender<MeasurementUpdate>,
    token: &CancellationToken,
) -> AppResult<()> {
    txn.execute(Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        compiled.sql,
        compiled.values,
    ))
    .await?;

    let mut watermark: Option<Decimal> = None;

    loop {
        if token.is_cancelled() {
            return Ok(());
        }

        let rows = tokio::select! {
            () = token.cancelled() => return Ok(()),
            fetched = txn.query_all(Statement::from_string(
                DatabaseBackend::Postgres,
                "FETCH ALL c",
            )) => fetched?,
        };

        for row in &rows {
            let diff: i64 = row.try_get("", "mz_diff")?;
            let mz_timestamp: Decimal = row.try_get("", "mz_timestamp")?;

            if !should_deliver(mz_timestamp, diff, simulate_watermark, &mut watermark) {
                continue;
            }

            let update = decode_update(row, data_type)?;
            tokio::select! {
                () = token.cancelled() => return Ok(()),
                sent = tx.send(update) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        if rows.is_empty() {
            tokio::select! {
                () = token.cancelled() => return Ok(()),
                () = sleep(FETCH_IDLE_SLEEP) => {}
            }
        }
    }
}

fn decode_update(row: &QueryResult, data_type: DataType) -> AppResult<MeasurementUpdate> {
    let raw_value: String = row.try_get("", "value")?;
    Ok(MeasurementUpdate {
        timeseries_id: row.try_get("", "timeseries_id")?,
        timestamp: row.try_get("", "timestamp")?,
        value: crate::services::codec::decode_value(&raw_value, data_type),
        provenance_id: row.try_get("", "provenance_id")?,
        created_on: row.try_get("", "created_on")?,
        sensor_id: row.try_get("", "sensor_id")?,
        type_id: row.try_get("", "type_id")?,
        sensor_name: row.try_get("", "sensor_name")?,
        type_name: row.try_get("", "type_name")?,
        data_type,
        unit: row.try_get("", "unit")?,
        sensor_metadata: row.try_get("", "sensor_metadata")?,
    })
}

/// Row-handling core of the fetch loop: apply the snapshot-watermark and
/// retraction rules to one `(mz_timestamp, mz_diff)` pair. Retractions
/// (diff != 1) are never delivered.
#[must_use]
pub fn should_deliver(
    mz_timestamp: Decimal,
    diff: i64,
    simulate_watermark: bool,
    watermark: &mut Option<Decimal>,
) -> bool {
    if simulate_watermark {
        let initial = *watermark.get_or_insert(mz_timestamp);
        if mz_timestamp <= initial {
            return false;
        }
    }
    diff == 1
}
