//! SeaORM entity models
//!
//! Datastore entities keep the camelCase column layout of the document
//! store; operations entities track searches and the review funnel.

mod academic_database;
mod document;
mod document_abstract;
mod document_database_mapping;
mod document_full;
mod document_pico_enhanced;
mod document_pico_raw;
mod funnel;
mod query;
mod rag_chat;
mod rag_query;
mod rag_summary;
mod search_result;
mod semantic_query;
mod semantic_result;

pub use funnel::FunnelStage;

// Datastore

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
};

pub use document_abstract::{
    Entity as DocumentAbstractEntity,
    Model as DocumentAbstract,
    ActiveModel as DocumentAbstractActiveModel,
    Column as DocumentAbstractColumn,
};

pub use document_full::{
    Entity as DocumentFullEntity,
    Model as DocumentFull,
    ActiveModel as DocumentFullActiveModel,
    Column as DocumentFullColumn,
};

pub use document_pico_raw::{
    Entity as PicoRawEntity,
    Model as PicoRaw,
    ActiveModel as PicoRawActiveModel,
    Column as PicoRawColumn,
};

pub use document_pico_enhanced::{
    Entity as PicoEnhancedEntity,
    Model as PicoEnhanced,
    ActiveModel as PicoEnhancedActiveModel,
    Column as PicoEnhancedColumn,
};

pub use academic_database::{
    Entity as AcademicDatabaseEntity,
    Model as AcademicDatabase,
    ActiveModel as AcademicDatabaseActiveModel,
    Column as AcademicDatabaseColumn,
};

pub use document_database_mapping::{
    Entity as MappingEntity,
    Model as DocumentDatabaseMapping,
    ActiveModel as MappingActiveModel,
    Column as MappingColumn,
};

// Operations

pub use query::{
    Entity as QueryEntity,
    Model as Query,
    ActiveModel as QueryActiveModel,
    Column as QueryColumn,
};

pub use search_result::{
    Entity as SearchResultEntity,
    Model as SearchResult,
    ActiveModel as SearchResultActiveModel,
    Column as SearchResultColumn,
};

pub use semantic_query::{
    Entity as SemanticQueryEntity,
    Model as SemanticQuery,
    ActiveModel as SemanticQueryActiveModel,
    Column as SemanticQueryColumn,
};

pub use semantic_result::{
    Entity as SemanticResultEntity,
    Model as SemanticResult,
    ActiveModel as SemanticResultActiveModel,
    Column as SemanticResultColumn,
};

pub use rag_query::{
    Entity as RagQueryEntity,
    Model as RagQuery,
    ActiveModel as RagQueryActiveModel,
};

pub use rag_summary::{
    Entity as RagSummaryEntity,
    Model as RagSummary,
    ActiveModel as RagSummaryActiveModel,
};

pub use rag_chat::{
    Entity as RagChatEntity,
    Model as RagChat,
    ActiveModel as RagChatActiveModel,
};
