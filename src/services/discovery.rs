//! Compilation of discovery requests into a single parameterized SQL query,
//! plus the discover/verify service functions that execute it.
//!
//! The compiler is a pure function over the request, the lowered value
//! conditions and a pre-resolved type → datatype map, so its output can be
//! asserted without a database. Every user-supplied literal becomes a bound
//! parameter; only table and alias names derived from the datatype enum and
//! sanitized type names are interpolated.

use std::collections::HashMap;

use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult, Statement, Value};

use crate::common::AppState;
use crate::entity::{sensors, DataType};
use crate::error::{AppError, AppResult};
use crate::filter::{
    self, DiscoveryRequest, FilterOperator, FilterValue, MeasurementFilter, ValueCondition,
    VerifyRequest, VerifyResponse,
};
use crate::services::types_registry;

/// A compiled discovery query: SQL text with dense `$n` placeholders and the
/// matching argument vector.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Default)]
pub(crate) struct Params {
    pub(crate) values: Vec<Value>,
}

impl Params {
    /// Bind a value and return its `$n` placeholder.
    pub(crate) fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }
}

/// Parse and lower the measurement filter expression, if any.
pub fn lowered_conditions(
    measurement_filter: Option<&MeasurementFilter>,
) -> AppResult<Vec<ValueCondition>> {
    let Some(mf) = measurement_filter else {
        return Ok(Vec::new());
    };
    match filter::parse(&mf.expression)? {
        Some(expr) => Ok(filter::lower(&expr)),
        None => Ok(Vec::new()),
    }
}

/// Compile a discovery request into one SELECT over the sensor graph.
pub fn compile(
    req: &DiscoveryRequest,
    conditions: &[ValueCondition],
    data_types: &HashMap<String, DataType>,
) -> AppResult<CompiledQuery> {
    let mut params = Params::default();
    let mut joins: Vec<String> = vec![
        "JOIN timeseries ts ON s.id = ts.sensor_id".to_string(),
        "JOIN \"types\" t ON ts.type_id = t.id".to_string(),
    ];
    let mut wheres: Vec<String> = vec!["s.is_active = true".to_string()];

    if let Some(tf) = &req.timeseries_filter {
        // Required types: the sensor must own ALL of them.
        if !tf.required_types.is_empty() {
            let placeholders: Vec<String> = tf
                .required_types
                .iter()
                .map(|name| params.bind(name.clone()))
                .collect();
            wheres.push(format!(
                "s.id IN (SELECT ts_req.sensor_id FROM timeseries ts_req \
                 JOIN \"types\" t_req ON ts_req.type_id = t_req.id \
                 WHERE t_req.name IN ({}) \
                 GROUP BY ts_req.sensor_id \
                 HAVING COUNT(DISTINCT t_req.id) = {})",
                placeholders.join(","),
                tf.required_types.len()
            ));
        }

        // Optional types: ANY of them suffices.
        if !tf.optional_types.is_empty() {
            let placeholders: Vec<String> = tf
                .optional_types
                .iter()
                .map(|name| params.bind(name.clone()))
                .collect();
            wheres.push(format!("t.name IN ({})", placeholders.join(",")));
        }

        if !tf.dataset_names.is_empty() {
            joins.push("JOIN dataset_types dt ON t.id = dt.type_id".to_string());
            joins.push("JOIN datasets d ON dt.dataset_id = d.id".to_string());
            let placeholders: Vec<String> = tf
                .dataset_names
                .iter()
                .map(|name| params.bind(name.clone()))
                .collect();
            wheres.push(format!("d.name IN ({})", placeholders.join(",")));
        }
    }

    if !conditions.is_empty() {
        let mf = req.measurement_filter.as_ref();
        let latest_only = mf.is_some_and(|m| m.latest_only);
        let time_range = mf.and_then(|m| m.time_range.as_ref());

        // One typed alias pair per distinct referenced type.
        let mut seen: Vec<&str> = Vec::new();
        for condition in conditions {
            if seen.contains(&condition.type_name.as_str()) {
                continue;
            }
            seen.push(&condition.type_name);

            let data_type = lookup_data_type(data_types, &condition.type_name)?;
            let alias = sanitize_alias(&condition.type_name);
            let ts_alias = format!("ts_{alias}");
            let m_alias = format!("m_{alias}");
            let table = data_type.measurement_table();

            let type_param = params.bind(condition.type_name.clone());
            joins.push(format!(
                "JOIN timeseries {ts_alias} ON s.id = {ts_alias}.sensor_id \
                 AND {ts_alias}.type_id = (SELECT id FROM \"types\" WHERE name = {type_param})"
            ));

            if latest_only {
                joins.push(format!(
                    "JOIN (SELECT timeseries_id, value, timestamp, \
                     ROW_NUMBER() OVER (PARTITION BY timeseries_id ORDER BY timestamp DESC) AS rn \
                     FROM {table}) {m_alias} \
                     ON {m_alias}.timeseries_id = {ts_alias}.id AND {m_alias}.rn = 1"
                ));
            } else {
                joins.push(format!(
                    "JOIN {table} {m_alias} ON {m_alias}.timeseries_id = {ts_alias}.id"
                ));
                if let Some(range) = time_range {
                    if let Some(start) = range.start_time {
                        let p = params.bind(start);
                        wheres.push(format!("{m_alias}.timestamp >= {p}"));
                    }
                    if let Some(end) = range.end_time {
                        let p = params.bind(end);
                        wheres.push(format!("{m_alias}.timestamp <= {p}"));
                    }
                }
            }
        }

        for condition in conditions {
            let alias = format!("m_{}", sanitize_alias(&condition.type_name));
            wheres.push(render_predicate(condition, &alias, &mut params)?);
        }
    }

    let mut sql = String::from(
        "SELECT DISTINCT s.id, s.name, s.parent_id, s.metadata, s.created_on, \
         s.is_active, s.is_available FROM sensors s ",
    );
    sql.push_str(&joins.join(" "));
    sql.push_str(" WHERE ");
    sql.push_str(&wheres.join(" AND "));
    sql.push_str(" ORDER BY s.name");

    if let Some(limit) = req.limit {
        if limit > 0 {
            let p = params.bind(limit as i64);
            sql.push_str(&format!(" LIMIT {p}"));
        }
    }

    Ok(CompiledQuery {
        sql,
        values: params.values,
    })
}

fn lookup_data_type(
    data_types: &HashMap<String, DataType>,
    type_name: &str,
) -> AppResult<DataType> {
    data_types.get(type_name).copied().ok_or_else(|| {
        AppError::Internal(format!("unresolved measurement type '{type_name}'"))
    })
}

/// Render the operator-specific predicate for one condition.
pub(crate) fn render_predicate(
    condition: &ValueCondition,
    alias: &str,
    params: &mut Params,
) -> AppResult<String> {
    let json_path = !condition.json_path.is_empty();
    let accessor = if json_path {
        let path = format!("{{{}}}", condition.json_path.join(","));
        let p = params.bind(path);
        format!("({alias}.value #>> {p}::text[])")
    } else {
        format!("{alias}.value")
    };

    match condition.operator {
        FilterOperator::Eq => {
            let p = bind_comparable(&condition.value, json_path, params);
            Ok(format!("{accessor} = {p}"))
        }
        FilterOperator::Neq => {
            let p = bind_comparable(&condition.value, json_path, params);
            Ok(format!("{accessor} != {p}"))
        }
        FilterOperator::Lt | FilterOperator::Gt | FilterOperator::Lteq | FilterOperator::Gteq => {
            let op = match condition.operator {
                FilterOperator::Lt => "<",
                FilterOperator::Gt => ">",
                FilterOperator::Lteq => "<=",
                _ => ">=",
            };
            let p = params.bind(numeric_param(&condition.value));
            Ok(format!("({accessor})::numeric {op} {p}"))
        }
        FilterOperator::Re => Ok(format!(
            "{accessor} ~ {}",
            params.bind(raw_text(&condition.value))
        )),
        FilterOperator::Ire => Ok(format!(
            "{accessor} ~* {}",
            params.bind(raw_text(&condition.value))
        )),
        FilterOperator::Nre => Ok(format!(
            "{accessor} !~ {}",
            params.bind(raw_text(&condition.value))
        )),
        FilterOperator::Nire => Ok(format!(
            "{accessor} !~* {}",
            params.bind(raw_text(&condition.value))
        )),
        FilterOperator::In | FilterOperator::Nin => {
            let FilterValue::List(items) = &condition.value else {
                return Err(AppError::Validation(format!(
                    "operator '{}' requires a list value",
                    condition.operator
                )));
            };
            if items.is_empty() {
                return Err(AppError::Validation(format!(
                    "operator '{}' requires a non-empty list",
                    condition.operator
                )));
            }
            let placeholders: Vec<String> = items
                .iter()
                .map(|item| bind_comparable(item, json_path, params))
                .collect();
            let not = if condition.operator == FilterOperator::Nin {
                "NOT "
            } else {
                ""
            };
            Ok(format!("{accessor} {not}IN ({})", placeholders.join(",")))
        }
        FilterOperator::Bbi => {
            let envelope = bind_envelope(condition, params)?;
            Ok(format!("ST_Intersects({alias}.value, {envelope})"))
        }
        FilterOperator::Bbc => {
            let envelope = bind_envelope(condition, params)?;
            Ok(format!("ST_Contains({envelope}, {alias}.value)"))
        }
        FilterOperator::Dlt => {
            let FilterValue::Coordinates(coords) = &condition.value else {
                return Err(spatial_value_error(condition));
            };
            let [lon, lat, meters] = coords[..] else {
                return Err(spatial_value_error(condition));
            };
            let p_lon = params.bind(lon);
            let p_lat = params.bind(lat);
            let p_dist = params.bind(meters);
            Ok(format!(
                "ST_DWithin({alias}.value::geography, \
                 ST_SetSRID(ST_MakePoint({p_lon}, {p_lat}), 4326)::geography, {p_dist})"
            ))
        }
    }
}

fn bind_envelope(condition: &ValueCondition, params: &mut Params) -> AppResult<String> {
    let FilterValue::Coordinates(coords) = &condition.value else {
        return Err(spatial_value_error(condition));
    };
    let [min_lon, min_lat, max_lon, max_lat] = coords[..] else {
        return Err(spatial_value_error(condition));
    };
    let p1 = params.bind(min_lon);
    let p2 = params.bind(min_lat);
    let p3 = params.bind(max_lon);
    let p4 = params.bind(max_lat);
    Ok(format!("ST_MakeEnvelope({p1}, {p2}, {p3}, {p4}, 4326)"))
}

fn spatial_value_error(condition: &ValueCondition) -> AppError {
    AppError::Validation(format!(
        "invalid coordinates for operator '{}'",
        condition.operator
    ))
}

/// Bind a comparison operand: natively typed against scalar columns, textual
/// against `->>`/`#>>` extractions.
fn bind_comparable(value: &FilterValue, json_path: bool, params: &mut Params) -> String {
    if json_path {
        return params.bind(raw_text(value));
    }
    match value {
        FilterValue::Null => params.bind(Value::String(None)),
        FilterValue::Bool(b) => params.bind(*b),
        FilterValue::Number(n) => params.bind(*n),
        FilterValue::Text(s) => params.bind(s.clone()),
        FilterValue::List(_) | FilterValue::Coordinates(_) => params.bind(raw_text(value)),
    }
}

fn numeric_param(value: &FilterValue) -> Value {
    match value {
        FilterValue::Number(n) => (*n).into(),
        other => raw_text(other).into(),
    }
}

/// Unquoted textual form of a value, for text-typed comparisons.
fn raw_text(value: &FilterValue) -> String {
    match value {
        FilterValue::Null => "null".to_string(),
        FilterValue::Bool(b) => b.to_string(),
        FilterValue::Number(n) => n.to_string(),
        FilterValue::Text(s) => s.clone(),
        FilterValue::List(items) => {
            let parts: Vec<String> = items.iter().map(raw_text).collect();
            format!("({})", parts.join(","))
        }
        FilterValue::Coordinates(coords) => {
            let parts: Vec<String> = coords.iter().map(f64::to_string).collect();
            format!("({})", parts.join(","))
        }
    }
}

/// SQL aliases derive from type names; anything outside `[A-Za-z0-9_]`
/// becomes an underscore.
fn sanitize_alias(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Execute a discovery request and return the matching sensors, ordered by name.
pub async fn discover(state: &AppState, req: &DiscoveryRequest) -> AppResult<Vec<sensors::Model>> {
    let conditions = lowered_conditions(req.measurement_filter.as_ref())?;
    let condition_type_names: Vec<&str> =
        conditions.iter().map(|c| c.type_name.as_str()).collect();
    let data_types = types_registry::resolve_data_types(state, condition_type_names).await?;

    let compiled = compile(req, &conditions, &data_types)?;
    tracing::debug!(sql = %compiled.sql, params = compiled.values.len(), "Compiled discovery query");

    let rows = state
        .db
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            compiled.sql,
            compiled.values,
        ))
        .await?;

    rows.iter()
        .map(|row| sensors::Model::from_query_result(row, "").map_err(AppError::from))
        .collect()
}

/// Partition the requested sensor names by discovery-filter membership.
///
/// With no filters at all, every name is verified.
pub async fn verify(state: &AppState, req: &VerifyRequest) -> AppResult<VerifyResponse> {
    if req.timeseries_filter.is_none() && req.measurement_filter.is_none() {
        return Ok(VerifyResponse {
            ok: true,
            verified: req.sensor_names.clone(),
            unverified: Vec::new(),
        });
    }

    let discovery = DiscoveryRequest {
        timeseries_filter: req.timeseries_filter.clone(),
        measurement_filter: req.measurement_filter.clone(),
        limit: None,
    };
    let matching = discover(state, &discovery).await?;
    let matching_names: std::collections::HashSet<&str> =
        matching.iter().map(|s| s.name.as_str()).collect();

    let mut verified = Vec::new();
    let mut unverified = Vec::new();
    for name in &req.sensor_names {
        if matching_names.contains(name.as_str()) {
            verified.push(name.clone());
        } else {
            unverified.push(name.clone());
        }
    }

    Ok(VerifyResponse {
        ok: unverified.is_empty(),
        verified,
        unverified,
    })
}
