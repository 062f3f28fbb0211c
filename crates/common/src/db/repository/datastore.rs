//! Document datastore access

use crate::db::models::*;
use crate::errors::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    FromQueryResult, IntoActiveModel, QueryFilter, QuerySelect, Set, SqlErr, Statement,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Length of the numeric mapping key
const HASH_KEY_LENGTH: usize = 16;

/// Length of generated AcademicDatabases ids
const SHORT_ID_LENGTH: usize = 12;

/// One parsed ingestion row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub document_id: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
}

/// Outcome of a row-by-row insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
}

impl InsertReport {
    pub fn merge(&mut self, other: InsertReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}

/// PICO fields for one document, raw or enhanced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicoRow {
    pub document_id: String,
    pub pico_p: Option<String>,
    pub pico_i: Option<String>,
    pub pico_c: Option<String>,
    pub pico_o: Option<String>,
}

/// Abstract joined with bibliographic data and the best available PICO text
#[derive(Debug, Clone, PartialEq, FromQueryResult)]
pub struct AbstractRecord {
    pub document_id: String,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: String,
    pub pico_p: Option<String>,
    pub pico_i: Option<String>,
    pub pico_c: Option<String>,
    pub pico_o: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct UnprocessedAbstract {
    document_id: String,
    abstract_text: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct FullTextRow {
    document_id: String,
    full_text: Option<String>,
}

/// Twelve leading digits of a random UUID read as a decimal integer
pub fn generate_short_id() -> String {
    uuid::Uuid::new_v4()
        .as_u128()
        .to_string()
        .chars()
        .take(SHORT_ID_LENGTH)
        .collect()
}

/// Numeric key: SHA-256, URL-safe base64, digits only, cut or zero-padded
pub fn generate_hash_key(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);

    let mut numeric: String = encoded
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(HASH_KEY_LENGTH)
        .collect();

    while numeric.len() < HASH_KEY_LENGTH {
        numeric.push('0');
    }
    numeric
}

/// Unique or foreign key violations are skipped rather than aborting a load
pub fn is_integrity_violation(err: &DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(_)) | Some(SqlErr::ForeignKeyConstraintViolation(_))
    )
}

/// Repository for the document datastore
#[derive(Clone)]
pub struct DatastoreRepository {
    conn: DatabaseConnection,
}

impl DatastoreRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Academic databases & mappings
    // ========================================================================

    /// Find the collection by name, creating it when missing. Returns its id.
    #[instrument(skip(self, description))]
    pub async fn ensure_database_exists(
        &self,
        database_name: &str,
        description: Option<&str>,
    ) -> Result<String> {
        if let Some(existing) = self.find_database(database_name).await? {
            info!(database_id = %existing.database_id, "Academic database found");
            return Ok(existing.database_id);
        }

        let row = AcademicDatabaseActiveModel {
            database_id: Set(generate_short_id()),
            database_name: Set(database_name.to_string()),
            description: Set(description.map(str::to_string)),
        };

        match AcademicDatabaseEntity::insert(row)
            .exec_without_returning(&self.conn)
            .await
        {
            Ok(_) => {}
            // another loader created it first
            Err(e) if is_integrity_violation(&e) => {
                debug!(error = %e, "Academic database inserted concurrently");
            }
            Err(e) => return Err(e.into()),
        }

        let created = self.find_database(database_name).await?.ok_or_else(|| {
            crate::errors::AppError::Ingestion {
                message: format!("Academic database '{}' missing after insert", database_name),
            }
        })?;

        info!(database_id = %created.database_id, "Academic database created");
        Ok(created.database_id)
    }

    async fn find_database(&self, database_name: &str) -> Result<Option<AcademicDatabase>> {
        AcademicDatabaseEntity::find()
            .filter(AcademicDatabaseColumn::DatabaseName.eq(database_name))
            .one(&self.conn)
            .await
            .map_err(Into::into)
    }

    /// Build the mapping row unless the document is already mapped
    pub async fn mapping_if_not_exists(
        &self,
        database_id: &str,
        document_id: &str,
    ) -> Result<Option<DocumentDatabaseMapping>> {
        let existing = MappingEntity::find()
            .filter(MappingColumn::DocumentId.eq(document_id))
            .filter(MappingColumn::DatabaseId.eq(database_id))
            .one(&self.conn)
            .await?;

        if existing.is_some() {
            debug!(document_id, database_id, "Mapping already exists");
            return Ok(None);
        }

        Ok(Some(DocumentDatabaseMapping {
            hash_key: generate_hash_key(&format!("{}{}", document_id, database_id)),
            document_id: document_id.to_string(),
            database_id: database_id.to_string(),
        }))
    }

    pub async fn insert_mappings(&self, mappings: Vec<DocumentDatabaseMapping>) -> Result<InsertReport> {
        let rows = mappings
            .into_iter()
            .map(|m| MappingActiveModel {
                hash_key: Set(m.hash_key),
                document_id: Set(m.document_id),
                database_id: Set(m.database_id),
            })
            .collect();
        self.insert_each::<MappingActiveModel>("DocumentDatabaseMapping", rows)
            .await
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub async fn insert_documents(&self, documents: &[NewDocument]) -> Result<InsertReport> {
        let rows = documents
            .iter()
            .map(|d| DocumentActiveModel {
                document_id: Set(d.document_id.clone()),
                title: Set(d.title.clone()),
                author: Set(d.authors.clone()),
                year: Set(d.year),
            })
            .collect();
        self.insert_each::<DocumentActiveModel>("Document", rows).await
    }

    pub async fn insert_abstracts(&self, documents: &[NewDocument]) -> Result<InsertReport> {
        let rows = documents
            .iter()
            .map(|d| DocumentAbstractActiveModel {
                document_id: Set(d.document_id.clone()),
                abstract_text: Set(d.abstract_text.clone()),
            })
            .collect();
        self.insert_each::<DocumentAbstractActiveModel>("DocumentAbstract", rows)
            .await
    }

    pub async fn insert_full_document(
        &self,
        document_id: &str,
        pdf_blob: Vec<u8>,
        full_text: Option<String>,
    ) -> Result<InsertReport> {
        let row = DocumentFullActiveModel {
            document_id: Set(document_id.to_string()),
            pdf_blob: Set(Some(pdf_blob)),
            full_text: Set(full_text),
        };
        self.insert_each::<DocumentFullActiveModel>("DocumentFull", vec![row])
            .await
    }

    /// Ids of documents with a stored PDF
    pub async fn full_text_document_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = DocumentFullEntity::find()
            .select_only()
            .column(DocumentFullColumn::DocumentId)
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Extracted full texts, skipping documents without text
    pub async fn load_full_texts(&self) -> Result<Vec<(String, String)>> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_string(
            backend,
            "SELECT documentId AS document_id, fullText AS full_text FROM DocumentFull",
        );

        let rows = FullTextRow::find_by_statement(stmt).all(&self.conn).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| match r.full_text {
                Some(text) if !text.trim().is_empty() => Some((r.document_id, text)),
                _ => None,
            })
            .collect())
    }

    // ========================================================================
    // PICO
    // ========================================================================

    /// Abstracts with no DocumentPICO_raw row yet
    pub async fn fetch_unprocessed_pico(&self) -> Result<Vec<(String, String)>> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_string(
            backend,
            r#"
            SELECT da.documentId AS document_id, da.abstract AS abstract_text
            FROM DocumentAbstract da
            LEFT JOIN DocumentPICO_raw dp ON da.documentId = dp.documentId
            WHERE dp.documentId IS NULL
            "#,
        );

        let rows = UnprocessedAbstract::find_by_statement(stmt)
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| match r.abstract_text {
                Some(text) if !text.trim().is_empty() => Some((r.document_id, text)),
                _ => None,
            })
            .collect())
    }

    pub async fn insert_pico_raw(&self, rows: &[PicoRow]) -> Result<InsertReport> {
        let rows = rows
            .iter()
            .map(|r| PicoRawActiveModel {
                document_id: Set(r.document_id.clone()),
                pico_p: Set(r.pico_p.clone()),
                pico_i: Set(r.pico_i.clone()),
                pico_c: Set(r.pico_c.clone()),
                pico_o: Set(r.pico_o.clone()),
            })
            .collect();
        self.insert_each::<PicoRawActiveModel>("DocumentPICO_raw", rows).await
    }

    pub async fn insert_pico_enhanced(&self, rows: &[PicoRow]) -> Result<InsertReport> {
        let rows = rows
            .iter()
            .map(|r| PicoEnhancedActiveModel {
                document_id: Set(r.document_id.clone()),
                pico_p: Set(r.pico_p.clone()),
                pico_i: Set(r.pico_i.clone()),
                pico_c: Set(r.pico_c.clone()),
                pico_o: Set(r.pico_o.clone()),
            })
            .collect();
        self.insert_each::<PicoEnhancedActiveModel>("DocumentPICO_enhanced", rows)
            .await
    }

    /// Store raw NER terms and, when present, their enhanced counterparts
    pub async fn insert_pico(&self, raw: &[PicoRow], enhanced: &[PicoRow]) -> Result<InsertReport> {
        let mut report = self.insert_pico_raw(raw).await?;
        if !enhanced.is_empty() {
            report.merge(self.insert_pico_enhanced(enhanced).await?);
        }
        Ok(report)
    }

    /// Documents with a non-empty abstract, enhanced PICO preferred over raw
    pub async fn load_abstract_records(&self) -> Result<Vec<AbstractRecord>> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_string(
            backend,
            r#"
            SELECT
                d.documentId AS document_id,
                d.title AS title,
                d.author AS authors,
                d.`year` AS year,
                a.abstract AS abstract_text,
                COALESCE(e.pico_p, r.pico_p) AS pico_p,
                COALESCE(e.pico_i, r.pico_i) AS pico_i,
                COALESCE(e.pico_c, r.pico_c) AS pico_c,
                COALESCE(e.pico_o, r.pico_o) AS pico_o
            FROM Document d
            INNER JOIN DocumentAbstract a ON d.documentId = a.documentId
            LEFT JOIN DocumentPICO_raw r ON d.documentId = r.documentId
            LEFT JOIN DocumentPICO_enhanced e ON d.documentId = e.documentId
            WHERE a.abstract IS NOT NULL AND a.abstract <> ''
            ORDER BY d.documentId
            "#,
        );

        let records = AbstractRecord::find_by_statement(stmt)
            .all(&self.conn)
            .await?;
        info!(count = records.len(), "Loaded abstract records");
        Ok(records)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Insert rows one at a time so a duplicate only skips its own row
    async fn insert_each<A>(&self, table: &str, rows: Vec<A>) -> Result<InsertReport>
    where
        A: ActiveModelTrait + Send,
        <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    {
        let mut report = InsertReport::default();

        for row in rows {
            match <A::Entity as EntityTrait>::insert(row)
                .exec_without_returning(&self.conn)
                .await
            {
                Ok(_) => report.inserted += 1,
                Err(e) if is_integrity_violation(&e) => {
                    warn!(table, error = %e, "Skipping row that violates integrity constraints");
                    report.duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        metrics::counter!(
            crate::metrics::names::DOCUMENTS_INGESTED,
            "table" => table.to_string()
        )
        .increment(report.inserted as u64);

        info!(
            table,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Rows inserted"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_is_twelve_digits() {
        for _ in 0..20 {
            let id = generate_short_id();
            assert_eq!(id.len(), 12);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_key_shape_and_determinism() {
        let a = generate_hash_key("16625675123456789012");
        let b = generate_hash_key("16625675123456789012");
        let c = generate_hash_key("16625676123456789012");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|ch| ch.is_ascii_digit()));
    }

    #[test]
    fn test_hash_key_keeps_digits_in_encoding_order() {
        let digest = Sha256::digest("abc".as_bytes());
        let encoded = URL_SAFE_NO_PAD.encode(digest);
        let digits: String = encoded.chars().filter(|c| c.is_ascii_digit()).collect();

        let key = generate_hash_key("abc");
        if digits.len() >= 16 {
            assert_eq!(key, digits[..16]);
        } else {
            assert!(key.starts_with(&digits));
            assert!(key[digits.len()..].chars().all(|c| c == '0'));
        }
    }

    #[test]
    fn test_insert_report_merge() {
        let mut total = InsertReport { inserted: 2, duplicates: 1 };
        total.merge(InsertReport { inserted: 3, duplicates: 0 });
        assert_eq!(total, InsertReport { inserted: 5, duplicates: 1 });
    }

    #[test]
    fn test_custom_errors_are_not_integrity_violations() {
        assert!(!is_integrity_violation(&DbErr::Custom("boom".into())));
    }
}
