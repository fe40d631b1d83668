use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Physical representation of a measurement value.
///
/// Chosen once per type; each variant maps to its own partitioned
/// measurement table.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[sea_orm(string_value = "numeric")]
    Numeric,
    #[sea_orm(string_value = "string")]
    String,
    #[sea_orm(string_value = "boolean")]
    Boolean,
    #[sea_orm(string_value = "json")]
    Json,
    #[sea_orm(string_value = "geoposition")]
    Geoposition,
    #[sea_orm(string_value = "geoshape")]
    Geoshape,
}

/// All datatypes, in the order measurement tables are scanned.
pub const ALL_DATA_TYPES: &[DataType] = &[
    DataType::Numeric,
    DataType::String,
    DataType::Boolean,
    DataType::Json,
    DataType::Geoposition,
    DataType::Geoshape,
];

impl DataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Geoposition => "geoposition",
            Self::Geoshape => "geoshape",
        }
    }

    /// Partitioned measurement table backing this datatype.
    #[must_use]
    pub fn measurement_table(self) -> &'static str {
        match self {
            Self::Numeric => "measurements_numeric",
            Self::String => "measurements_string",
            Self::Boolean => "measurements_boolean",
            Self::Json => "measurements_json",
            Self::Geoposition => "measurements_geoposition",
            Self::Geoshape => "measurements_geoshape",
        }
    }

    /// Streaming view exposing the latest measurement per timeseries.
    #[must_use]
    pub fn streaming_view(self) -> &'static str {
        match self {
            Self::Numeric => "latest_measurements_numeric",
            Self::String => "latest_measurements_string",
            Self::Boolean => "latest_measurements_boolean",
            Self::Json => "latest_measurements_json",
            Self::Geoposition => "latest_measurements_geoposition",
            Self::Geoshape => "latest_measurements_geoshape",
        }
    }

    #[must_use]
    pub fn is_geometry(self) -> bool {
        matches!(self, Self::Geoposition | Self::Geoshape)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "types")]
#[schema(as = MeasurementType)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub data_type: DataType,
    pub metadata: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::timeseries::Entity")]
    Timeseries,
    #[sea_orm(has_many = "super::dataset_types::Entity")]
    DatasetTypes,
}

impl Related<super::timeseries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Timeseries.def()
    }
}

impl Related<super::dataset_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
