//! DocumentFull entity: the PDF blob plus its extracted text

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "DocumentFull")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_name = "documentId")]
    pub document_id: String,

    #[serde(skip)]
    #[sea_orm(column_name = "pdfBlob", column_type = "Blob", nullable)]
    pub pdf_blob: Option<Vec<u8>>,

    #[sea_orm(column_name = "fullText", column_type = "Text", nullable)]
    pub full_text: Option<String>,
}

// No foreign key: a PDF may arrive before its abstract is ingested
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
