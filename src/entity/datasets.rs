use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "datasets")]
#[schema(as = Dataset)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub created_on: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dataset_types::Entity")]
    DatasetTypes,
}

impl Related<super::dataset_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DatasetTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
