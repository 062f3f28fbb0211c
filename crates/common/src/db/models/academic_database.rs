//! AcademicDatabases entity: the logical collection a document was ingested from

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "AcademicDatabases")]
pub struct Model {
    /// 12-digit numeric id
    #[sea_orm(primary_key, auto_increment = false, column_name = "databaseId")]
    pub database_id: String,

    #[sea_orm(column_name = "databaseName", unique)]
    pub database_name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document_database_mapping::Entity")]
    Mappings,
}

impl Related<super::document_database_mapping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mappings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
