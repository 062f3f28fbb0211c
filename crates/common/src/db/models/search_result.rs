//! Search result entity: one retrieved document per query, carrying its funnel stage

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};


#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub query_id: i32,

    /// PMID of the retrieved document
    pub source_id: i64,

    pub similarity: f64,

    #[sea_orm(column_type = "Text", nullable)]
    pub authors: Option<String>,

    pub year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,

    #[serde(rename = "abstract")]
    #[sea_orm(column_name = "abstract", column_type = "Text", nullable)]
    pub abstract_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_p: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_i: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_c: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_o: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub funnel_stage: String,

    pub is_archived: bool,

    pub has_pdf: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::query::Entity",
        from = "Column::QueryId",
        to = "super::query::Column::Id",
        on_delete = "Cascade"
    )]
    Query,
}

impl Related<super::query::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Query.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
