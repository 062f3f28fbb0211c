//! Document entity (bibliographic record keyed by PMID)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "Document")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_name = "documentId")]
    pub document_id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,

    /// Comma separated author list as delivered by PubMed
    #[sea_orm(column_type = "Text", nullable)]
    pub author: Option<String>,

    pub year: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::document_abstract::Entity")]
    Abstract,

    #[sea_orm(has_one = "super::document_pico_raw::Entity")]
    PicoRaw,

    #[sea_orm(has_one = "super::document_pico_enhanced::Entity")]
    PicoEnhanced,
}

impl Related<super::document_abstract::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Abstract.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
