use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "sensors")]
#[schema(as = Sensor)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub parent_id: Option<i64>,
    pub metadata: Option<Json>,
    #[schema(value_type = String)]
    pub created_on: DateTimeWithTimeZone,
    pub is_active: bool,
    pub is_available: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id"
    )]
    Parent,
    #[sea_orm(has_many = "super::timeseries::Entity")]
    Timeseries,
}

impl Related<super::timeseries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Timeseries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
