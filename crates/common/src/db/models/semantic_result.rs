//! Semantic result entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "semantic_result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub semantic_query_id: i32,

    #[sea_orm(column_type = "Json")]
    pub source_ids: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::semantic_query::Entity",
        from = "Column::SemanticQueryId",
        to = "super::semantic_query::Column::Id",
        on_delete = "Cascade"
    )]
    SemanticQuery,
}

impl Related<super::semantic_query::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SemanticQuery.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
