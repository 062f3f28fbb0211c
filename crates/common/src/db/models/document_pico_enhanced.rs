//! DocumentPICO_enhanced entity: LLM rewritten PICO sentences

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "DocumentPICO_enhanced")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_name = "documentId")]
    pub document_id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_p: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_i: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_c: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pico_o: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::DocumentId"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
