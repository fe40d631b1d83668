//! Cached resolution of type names to their registry records.
//!
//! Every discovery request and every streaming subscription resolves the
//! datatype of each referenced type name; the registry is small and changes
//! rarely, so lookups go through the moka cache in `AppState`.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::common::AppState;
use crate::entity::{types, DataType};
use crate::error::{AppError, AppResult};

/// Resolve a single type name, hitting the cache first.
pub async fn resolve_type(state: &AppState, name: &str) -> AppResult<Option<Arc<types::Model>>> {
    if let Some(model) = state.type_cache.get(name).await {
        return Ok(Some(model));
    }

    let found = types::Entity::find()
        .filter(types::Column::Name.eq(name))
        .one(&state.db)
        .await?;

    match found {
        Some(model) => {
            let model = Arc::new(model);
            state
                .type_cache
                .insert(name.to_string(), model.clone())
                .await;
            Ok(Some(model))
        }
        None => Ok(None),
    }
}

/// Resolve the datatype of every name; unknown names are a validation error,
/// since a filter referencing a type that does not exist can never match.
pub async fn resolve_data_types<'a>(
    state: &AppState,
    names: impl IntoIterator<Item = &'a str>,
) -> AppResult<HashMap<String, DataType>> {
    let mut map = HashMap::new();
    for name in names {
        if map.contains_key(name) {
            continue;
        }
        let model = resolve_type(state, name).await?.ok_or_else(|| {
            AppError::Validation(format!("unknown measurement type '{name}'"))
        })?;
        map.insert(name.to_string(), model.data_type);
    }
    Ok(map)
}
