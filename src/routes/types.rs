use axum::{
    extract::{Path, Query, State},
    Json,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use utoipa::IntoParams;

use crate::common::AppState;
use crate::entity::{sensors, types};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTypesQuery {
    /// Offset for pagination
    #[serde(default)]
    pub offset: u64,
    /// Limit for pagination (default 50)
    pub limit: Option<u64>,
}

/// List measurement types
#[utoipa::path(
    get,
    path = "/api/v1/types",
    params(ListTypesQuery),
    responses(
        (status = 200, description = "Paginated list of types"),
    ),
    tag = "types"
)]
pub async fn list_types(
    State(state): State<AppState>,
    Query(params): Query<ListTypesQuery>,
) -> AppResult<Json<JsonValue>> {
    let limit = params.limit.unwrap_or(50).max(1);

    let total = types::Entity::find().count(&state.db).await?;
    let types_list = types::Entity::find()
        .order_by_asc(types::Column::Name)
        .offset(params.offset)
        .limit(limit)
        .all(&state.db)
        .await?;

    Ok(Json(json!({
        "types": types_list,
        "total": total,
        "offset": params.offset,
        "limit": limit,
    })))
}

/// Get a type by name, with the sensors measuring it
#[utoipa::path(
    get,
    path = "/api/v1/types/{name}",
    params(("name" = String, Path, description = "Type name")),
    responses(
        (status = 200, description = "Type with its sensors"),
        (status = 404, description = "Type not found"),
    ),
    tag = "types"
)]
pub async fn get_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<JsonValue>> {
    let type_record = types::Entity::find()
        .filter(types::Column::Name.eq(&name))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Type '{name}' not found")))?;

    let rows = state
        .db
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT DISTINCT s.id, s.name, s.parent_id, s.metadata, s.created_on, \
             s.is_active, s.is_available \
             FROM sensors s \
             JOIN timeseries ts ON s.id = ts.sensor_id \
             WHERE ts.type_id = $1 \
             ORDER BY s.name",
            [type_record.id.into()],
        ))
        .await?;

    let sensors = rows
        .iter()
        .map(|row| sensors::Model::from_query_result(row, "").map_err(AppError::from))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(json!({
        "type": type_record,
        "sensors": sensors,
    })))
}
