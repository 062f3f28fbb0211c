//! DocumentDatabaseMapping entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "DocumentDatabaseMapping")]
pub struct Model {
    /// 16-digit key derived from documentId + databaseId
    #[sea_orm(primary_key, auto_increment = false, column_name = "hashKey")]
    pub hash_key: String,

    #[sea_orm(column_name = "documentId")]
    pub document_id: String,

    #[sea_orm(column_name = "databaseId")]
    pub database_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::academic_database::Entity",
        from = "Column::DatabaseId",
        to = "super::academic_database::Column::DatabaseId"
    )]
    Database,
}

impl Related<super::academic_database::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Database.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
