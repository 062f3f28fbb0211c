//! Repository pattern for database operations
//!
//! `DatastoreRepository` owns the document store (documents, abstracts,
//! PICO rows, collection bookkeeping). `OperationsRepository` owns search
//! history and the review funnel.

mod datastore;
mod operations;

pub use datastore::{
    generate_hash_key, generate_short_id, is_integrity_violation, AbstractRecord,
    DatastoreRepository, InsertReport, NewDocument, PicoRow,
};
pub use operations::{fold_funnel_counts, FunnelCount, NewResult, OperationsRepository};
