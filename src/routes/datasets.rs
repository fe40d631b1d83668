use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    EntityTrait, FromQueryResult, QueryFilter, QueryOrder, Set, Statement,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::entity::{dataset_types, datasets, sensors, types};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDatasetRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Types added to the dataset as required on creation.
    #[serde(default)]
    pub type_names: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DatasetTypesRequest {
    pub type_names: Vec<String>,
    #[serde(default)]
    pub is_required: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TypeInDataset {
    #[serde(flatten)]
    pub type_record: types::Model,
    pub is_required: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatasetResponse {
    pub dataset: datasets::Model,
    pub types: Vec<TypeInDataset>,
}

/// Resolve a dataset by name.
async fn resolve_dataset(db: &DatabaseConnection, name: &str) -> AppResult<datasets::Model> {
    datasets::Entity::find()
        .filter(datasets::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Dataset '{name}' not found")))
}

async fn dataset_with_types(
    state: &AppState,
    dataset: datasets::Model,
) -> AppResult<DatasetResponse> {
    let rows = dataset_types::Entity::find()
        .find_also_related(types::Entity)
        .filter(dataset_types::Column::DatasetId.eq(dataset.id))
        .order_by_asc(types::Column::Name)
        .all(&state.db)
        .await?;

    let types = rows
        .into_iter()
        .filter_map(|(membership, type_record)| {
            type_record.map(|t| TypeInDataset {
                type_record: t,
                is_required: membership.is_required,
            })
        })
        .collect();

    Ok(DatasetResponse { dataset, types })
}

/// Create a dataset
#[utoipa::path(
    post,
    path = "/api/v1/datasets",
    request_body = CreateDatasetRequest,
    responses(
        (status = 201, description = "Dataset created", body = DatasetResponse),
        (status = 400, description = "Invalid request"),
    ),
    tag = "datasets"
)]
pub async fn create_dataset(
    State(state): State<AppState>,
    Json(req): Json<CreateDatasetRequest>,
) -> AppResult<(StatusCode, Json<DatasetResponse>)> {
    if req.name.is_empty() {
        return Err(AppError::Validation("dataset name is required".to_string()));
    }

    let dataset = datasets::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(req.name.clone()),
        description: Set(req.description.clone()),
        created_on: Set(Utc::now().into()),
    }
    .insert(&state.db)
    .await?;

    if !req.type_names.is_empty() {
        add_types(&state, dataset.id, &req.type_names, true).await?;
    }

    let response = dataset_with_types(&state, dataset).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a dataset with its types
#[utoipa::path(
    get,
    path = "/api/v1/datasets/{name}",
    params(("name" = String, Path, description = "Dataset name")),
    responses(
        (status = 200, description = "Dataset with types", body = DatasetResponse),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "datasets"
)]
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DatasetResponse>> {
    let dataset = resolve_dataset(&state.db, &name).await?;
    Ok(Json(dataset_with_types(&state, dataset).await?))
}

/// Add types to a dataset
#[utoipa::path(
    post,
    path = "/api/v1/datasets/{name}/types",
    params(("name" = String, Path, description = "Dataset name")),
    request_body = DatasetTypesRequest,
    responses(
        (status = 200, description = "Types added"),
        (status = 404, description = "Dataset or type not found"),
    ),
    tag = "datasets"
)]
pub async fn add_types_to_dataset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DatasetTypesRequest>,
) -> AppResult<Json<JsonValue>> {
    if req.type_names.is_empty() {
        return Err(AppError::Validation(
            "at least one type name must be provided".to_string(),
        ));
    }

    let dataset = resolve_dataset(&state.db, &name).await?;
    add_types(&state, dataset.id, &req.type_names, req.is_required).await?;

    Ok(Json(json!({"message": "types added to dataset"})))
}

async fn add_types(
    state: &AppState,
    dataset_id: Uuid,
    type_names: &[String],
    is_required: bool,
) -> AppResult<()> {
    let found = types::Entity::find()
        .filter(types::Column::Name.is_in(type_names.iter().cloned()))
        .all(&state.db)
        .await?;

    for name in type_names {
        if !found.iter().any(|t| &t.name == name) {
            return Err(AppError::NotFound(format!("Type '{name}' not found")));
        }
    }

    for type_record in found {
        let membership = dataset_types::ActiveModel {
            dataset_id: Set(dataset_id),
            type_id: Set(type_record.id),
            is_required: Set(is_required),
            created_on: Set(Utc::now().into()),
            ..Default::default()
        };
        dataset_types::Entity::insert(membership)
            .on_conflict(
                OnConflict::columns([
                    dataset_types::Column::DatasetId,
                    dataset_types::Column::TypeId,
                ])
                .update_column(dataset_types::Column::IsRequired)
                .to_owned(),
            )
            .exec(&state.db)
            .await?;
    }

    Ok(())
}

/// Remove types from a dataset
#[utoipa::path(
    delete,
    path = "/api/v1/datasets/{name}/types",
    params(("name" = String, Path, description = "Dataset name")),
    request_body = DatasetTypesRequest,
    responses(
        (status = 200, description = "Types removed"),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "datasets"
)]
pub async fn remove_types_from_dataset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DatasetTypesRequest>,
) -> AppResult<Json<JsonValue>> {
    if req.type_names.is_empty() {
        return Err(AppError::Validation(
            "at least one type name must be provided".to_string(),
        ));
    }

    let dataset = resolve_dataset(&state.db, &name).await?;

    let type_ids: Vec<i64> = types::Entity::find()
        .filter(types::Column::Name.is_in(req.type_names.iter().cloned()))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();

    dataset_types::Entity::delete_many()
        .filter(dataset_types::Column::DatasetId.eq(dataset.id))
        .filter(dataset_types::Column::TypeId.is_in(type_ids))
        .exec(&state.db)
        .await?;

    Ok(Json(json!({"message": "types removed from dataset"})))
}

/// List the sensors of a dataset
///
/// A sensor is in a dataset iff it owns at least one timeseries whose type
/// belongs to the dataset.
#[utoipa::path(
    get,
    path = "/api/v1/datasets/{name}/sensors",
    params(("name" = String, Path, description = "Dataset name")),
    responses(
        (status = 200, description = "Sensors in the dataset"),
        (status = 404, description = "Dataset not found"),
    ),
    tag = "datasets"
)]
pub async fn dataset_sensors(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<JsonValue>> {
    let dataset = resolve_dataset(&state.db, &name).await?;

    let rows = state
        .db
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT DISTINCT s.id, s.name, s.parent_id, s.metadata, s.created_on, \
             s.is_active, s.is_available \
             FROM sensors s \
             JOIN timeseries ts ON s.id = ts.sensor_id \
             JOIN dataset_types dt ON ts.type_id = dt.type_id \
             WHERE dt.dataset_id = $1 AND s.is_active = true \
             ORDER BY s.name",
            [dataset.id.into()],
        ))
        .await?;

    let sensors = rows
        .iter()
        .map(|row| sensors::Model::from_query_result(row, "").map_err(AppError::from))
        .collect::<AppResult<Vec<_>>>()?;

    let count = sensors.len();
    Ok(Json(json!({
        "sensors": sensors,
        "count": count,
    })))
}
