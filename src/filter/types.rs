use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Comparison, pattern, list and geospatial operators of the filter DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Lt,
    Gt,
    Lteq,
    Gteq,
    Re,
    Ire,
    Nre,
    Nire,
    In,
    Nin,
    Bbi,
    Bbc,
    Dlt,
}

/// Every operator token, used for the rightmost-operator scan in the parser.
pub const ALL_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::Lt,
    FilterOperator::Gt,
    FilterOperator::Lteq,
    FilterOperator::Gteq,
    FilterOperator::Re,
    FilterOperator::Ire,
    FilterOperator::Nre,
    FilterOperator::Nire,
    FilterOperator::In,
    FilterOperator::Nin,
    FilterOperator::Bbi,
    FilterOperator::Bbc,
    FilterOperator::Dlt,
];

impl FilterOperator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Lteq => "lteq",
            Self::Gteq => "gteq",
            Self::Re => "re",
            Self::Ire => "ire",
            Self::Nre => "nre",
            Self::Nire => "nire",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Bbi => "bbi",
            Self::Bbc => "bbc",
            Self::Dlt => "dlt",
        }
    }

    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        ALL_OPERATORS.iter().copied().find(|op| op.as_str() == token)
    }

    /// Geospatial operators cannot be pushed into the streaming source and
    /// are evaluated at the application layer instead.
    #[must_use]
    pub fn is_spatial(self) -> bool {
        matches!(self, Self::Bbi | Self::Bbc | Self::Dlt)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed filter value.
///
/// `Coordinates` is the arity-checked float list of the geospatial operators;
/// every other parenthesized list parses to `List`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FilterValue>),
    Coordinates(Vec<f64>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Coordinates(coords) => {
                f.write_str("(")?;
                for (i, c) in coords.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A single leaf condition: `type[.json.path].operator.value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FilterCondition {
    /// Type name the condition targets.
    pub type_name: String,
    /// Path into a JSON value, empty for scalar measurements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_path: Vec<String>,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// Parsed filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Condition(FilterCondition),
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_children(
            f: &mut fmt::Formatter<'_>,
            name: &str,
            children: &[FilterExpression],
        ) -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::Condition(c) => {
                write!(f, "{}", c.type_name)?;
                for segment in &c.json_path {
                    write!(f, ".{segment}")?;
                }
                write!(f, ".{}.{}", c.operator, c.value)
            }
            Self::And(children) => write_children(f, "and", children),
            Self::Or(children) => write_children(f, "or", children),
        }
    }
}

/// A lowered value condition ready for SQL generation.
///
/// The boolean structure of the expression tree is discarded here; the
/// compiler treats the list as a conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValueCondition {
    pub type_name: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_path: Vec<String>,
}

impl ValueCondition {
    #[must_use]
    pub fn is_spatial(&self) -> bool {
        self.operator.is_spatial()
    }
}

/// Time constraint applied to measurement predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Structural filter: which timeseries types a sensor must or may own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeseriesFilter {
    /// Sensors must own a timeseries for ALL of these types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_types: Vec<String>,
    /// Sensors must own a timeseries for ANY of these types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_types: Vec<String>,
    /// Restrict to sensors with a timeseries typed inside one of these datasets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dataset_names: Vec<String>,
}

impl TimeseriesFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required_types.is_empty()
            && self.optional_types.is_empty()
            && self.dataset_names.is_empty()
    }
}

/// Value filter over measurements, expressed in the filter DSL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MeasurementFilter {
    /// Evaluate predicates only against each timeseries' most recent measurement.
    #[serde(default)]
    pub latest_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Filter expression, e.g. `or(o2.eq.2, and(temp.gteq.20, temp.lteq.30))`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expression: String,
}

/// Request to find sensors by structural and measurement-value predicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DiscoveryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries_filter: Option<TimeseriesFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_filter: Option<MeasurementFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl DiscoveryRequest {
    /// True when no filter dimension is present at all.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.timeseries_filter.is_none() && self.measurement_filter.is_none()
    }
}

/// Request to partition a sensor-name list by discovery-filter membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VerifyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries_filter: Option<TimeseriesFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_filter: Option<MeasurementFilter>,
    pub sensor_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    /// True iff every requested sensor matched the filters.
    pub ok: bool,
    pub verified: Vec<String>,
    pub unverified: Vec<String>,
}
