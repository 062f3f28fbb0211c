//! One TiDB vector table

use super::{format_embedding, MetadataFilters, ScoredNode, VectorDocument};
use crate::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement, Value};
use tracing::{debug, info, instrument};

/// Rows per multi-row INSERT
const INSERT_BATCH: usize = 100;

/// Table names are interpolated into SQL
pub fn validate_table_name(table: &str) -> Result<()> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::VectorStore {
            message: format!("Invalid vector table name '{}'", table),
        });
    }
    Ok(())
}

#[derive(Debug, FromQueryResult)]
struct NodeRow {
    id: String,
    document: Option<String>,
    meta: Option<String>,
    distance: f64,
}

/// Vector table: `id, document, meta, embedding, create_time, update_time`
#[derive(Clone)]
pub struct VectorStore {
    conn: DatabaseConnection,
    table: String,
    dimension: usize,
}

impl VectorStore {
    pub fn new(conn: DatabaseConnection, table: impl Into<String>, dimension: usize) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            conn,
            table,
            dimension,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn statement(&self, sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(self.conn.get_database_backend(), sql, values)
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            r#"CREATE TABLE IF NOT EXISTS `{table}` (
                id VARCHAR(64) PRIMARY KEY,
                document TEXT,
                meta JSON,
                embedding VECTOR({dim}) NOT NULL COMMENT 'hnsw(distance=cosine)',
                create_time DATETIME DEFAULT CURRENT_TIMESTAMP,
                update_time DATETIME DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            )"#,
            table = self.table,
            dim = self.dimension
        )
    }

    pub async fn ensure_table(&self) -> Result<()> {
        self.conn
            .execute_unprepared(&self.create_table_sql())
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("Failed to create {}: {}", self.table, e),
            })?;
        debug!(table = %self.table, "Vector table ensured");
        Ok(())
    }

    /// Upsert documents with their embeddings. Returns rows written.
    #[instrument(skip(self, documents, embeddings), fields(table = %self.table, count = documents.len()))]
    pub async fn add(&self, documents: &[VectorDocument], embeddings: &[Vec<f32>]) -> Result<usize> {
        if documents.len() != embeddings.len() {
            return Err(AppError::VectorStore {
                message: format!(
                    "{} documents but {} embeddings",
                    documents.len(),
                    embeddings.len()
                ),
            });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(AppError::VectorStore {
                message: format!(
                    "Embedding dimension {} does not match table dimension {}",
                    bad.len(),
                    self.dimension
                ),
            });
        }

        let mut written = 0;
        let pairs: Vec<_> = documents.iter().zip(embeddings).collect();

        for batch in pairs.chunks(INSERT_BATCH) {
            let placeholders = vec!["(?, ?, ?, ?)"; batch.len()].join(", ");
            let sql = format!(
                "INSERT INTO `{}` (id, document, meta, embedding) VALUES {} \
                 ON DUPLICATE KEY UPDATE document = VALUES(document), meta = VALUES(meta), \
                 embedding = VALUES(embedding)",
                self.table, placeholders
            );

            let mut values = Vec::with_capacity(batch.len() * 4);
            for (doc, embedding) in batch {
                values.push(Value::from(doc.id.clone()));
                values.push(Value::from(doc.text.clone()));
                values.push(Value::from(serde_json::Value::Object(doc.metadata.clone()).to_string()));
                values.push(Value::from(format_embedding(embedding)));
            }

            self.conn
                .execute(self.statement(sql, values))
                .await
                .map_err(|e| AppError::VectorStore {
                    message: format!("Insert into {} failed: {}", self.table, e),
                })?;
            written += batch.len();
        }

        info!(written, "Vectors stored");
        Ok(written)
    }

    /// Nearest neighbours by cosine distance, closest first
    pub async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filters: Option<&MetadataFilters>,
    ) -> Result<Vec<ScoredNode>> {
        let mut values = vec![Value::from(format_embedding(embedding))];

        let where_clause = match filters.map(|f| f.to_sql()).transpose()?.flatten() {
            Some((sql, filter_values)) => {
                values.extend(filter_values);
                format!("WHERE {}", sql)
            }
            None => String::new(),
        };
        values.push(Value::from(top_k as u64));

        let sql = format!(
            "SELECT id, document, CAST(meta AS CHAR) AS meta, \
             VEC_COSINE_DISTANCE(embedding, ?) AS distance \
             FROM `{}` {} ORDER BY distance ASC LIMIT ?",
            self.table, where_clause
        );

        let rows = NodeRow::find_by_statement(self.statement(sql, values))
            .all(&self.conn)
            .await
            .map_err(|e| AppError::VectorStore {
                message: format!("Query on {} failed: {}", self.table, e),
            })?;

        Ok(rows.into_iter().map(row_to_node).collect())
    }

    /// Delete nodes whose metadata lacks any of `required_keys`
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn delete_missing_metadata(&self, required_keys: &[String]) -> Result<u64> {
        if required_keys.is_empty() {
            return Ok(0);
        }

        let conditions = required_keys
            .iter()
            .map(|key| -> Result<String> {
                validate_table_name(key).map_err(|_| {
                    AppError::validation(format!("Invalid metadata key '{}'", key), Some("required"))
                })?;
                Ok(format!(
                    "JSON_EXTRACT(meta, '$.{key}') IS NULL OR JSON_UNQUOTE(JSON_EXTRACT(meta, '$.{key}')) = ''"
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let sql = format!(
            "DELETE FROM `{}` WHERE meta IS NULL OR {}",
            self.table,
            conditions.join(" OR ")
        );

        let result = self.conn.execute(self.statement(sql, vec![])).await?;
        info!(deleted = result.rows_affected(), "Pruned nodes with missing metadata");
        Ok(result.rows_affected())
    }
}

fn row_to_node(row: NodeRow) -> ScoredNode {
    let metadata = row
        .meta
        .as_deref()
        .and_then(|m| serde_json::from_str::<serde_json::Value>(m).ok())
        .and_then(|v| match v {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    ScoredNode {
        id: row.id,
        text: row.document.unwrap_or_default(),
        metadata,
        score: 1.0 - row.distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("scibert_synergy_pico").is_ok());
        assert!(validate_table_name("scibert-synergy").is_err());
        assert!(validate_table_name("t; DROP TABLE x").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn test_create_table_sql_uses_dimension() {
        let store = VectorStore::new(DatabaseConnection::Disconnected, "scibert_synergy", 768).unwrap();
        let sql = store.create_table_sql();
        assert!(sql.contains("`scibert_synergy`"));
        assert!(sql.contains("VECTOR(768)"));
    }

    #[test]
    fn test_row_to_node_scores_and_metadata() {
        let node = row_to_node(NodeRow {
            id: "abc".into(),
            document: Some("text".into()),
            meta: Some(r#"{"source":"16625675","year":"2006"}"#.into()),
            distance: 0.25,
        });
        assert!((node.score - 0.75).abs() < 1e-9);
        assert_eq!(node.source().as_deref(), Some("16625675"));

        let broken = row_to_node(NodeRow {
            id: "x".into(),
            document: None,
            meta: Some("not json".into()),
            distance: 1.0,
        });
        assert!(broken.metadata.is_empty());
        assert_eq!(broken.text, "");
    }
}
