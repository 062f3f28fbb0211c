//! Semantic query entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "semantic_query")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: i32,

    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub query_text: String,

    /// Requested fields, e.g. ["Patient", "Outcome"]
    #[sea_orm(column_type = "Json", nullable)]
    pub fields: Option<Json>,

    /// Source ids the search was restricted to
    #[sea_orm(column_type = "Json", nullable)]
    pub source_ids: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::semantic_result::Entity")]
    SemanticResults,
}

impl Related<super::semantic_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SemanticResults.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
