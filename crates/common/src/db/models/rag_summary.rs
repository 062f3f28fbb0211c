//! Multi-document summary record

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rag_summaries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub project_id: Option<i32>,

    #[sea_orm(column_type = "Json")]
    pub document_ids: Json,

    #[sea_orm(column_type = "Text")]
    pub summary: String,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
