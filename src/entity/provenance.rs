use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ingestion source, identified by (lineage, collector, collector version).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "provenance")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub lineage: String,
    pub data_collector: String,
    pub data_collector_version: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
