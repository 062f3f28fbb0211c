//! Database layer for LitFunnel
//!
//! Provides:
//! - SeaORM entity models for the datastore and operations stores
//! - Repositories for data access
//! - Connection management for the three MySQL/TiDB databases
//! - Schema bootstrap

pub mod models;
mod repository;

pub use repository::{
    fold_funnel_counts, generate_hash_key, generate_short_id, is_integrity_violation,
    AbstractRecord, DatastoreRepository, FunnelCount, InsertReport, NewDocument, NewResult,
    OperationsRepository, PicoRow,
};

use crate::config::{AppConfig, DatabaseConfig};
use crate::errors::{AppError, Result};
use sea_orm::sea_query::Table;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityName, EntityTrait, Schema,
};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Datastore DDL applied by `ensure_datastore_schema`
pub const DATASTORE_SCHEMA: &str = include_str!("../../sql/datastore_schema.sql");

/// Connections to the document datastore, the operations store and the
/// database holding the vector tables
#[derive(Clone)]
pub struct Databases {
    pub datastore: DatabaseConnection,
    pub operations: DatabaseConnection,
    pub vectors: DatabaseConnection,
}

/// Per-database ping outcome
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub datastore: bool,
    pub operations: bool,
    pub vectors: bool,
}

impl DatabaseHealth {
    pub fn all_up(&self) -> bool {
        self.datastore && self.operations && self.vectors
    }
}

impl Databases {
    /// Connect all three databases from configuration
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let db = &config.database;

        let datastore = connect_one("datastore", &db.datastore_url, db).await?;
        let operations = connect_one("operations", &db.operations_url, db).await?;
        let vectors = if db.vector_url.is_some() {
            connect_one("vectors", config.vector_database_url(), db).await?
        } else {
            datastore.clone()
        };

        info!("Database connections established");

        Ok(Self {
            datastore,
            operations,
            vectors,
        })
    }

    /// Ping every connection
    pub async fn ping(&self) -> DatabaseHealth {
        DatabaseHealth {
            datastore: ping(&self.datastore).await.is_ok(),
            operations: ping(&self.operations).await.is_ok(),
            vectors: ping(&self.vectors).await.is_ok(),
        }
    }

    /// Create the datastore tables when missing
    pub async fn ensure_datastore_schema(&self) -> Result<usize> {
        apply_schema(&self.datastore, DATASTORE_SCHEMA).await
    }

    /// Create the operations tables from the entity definitions.
    /// With `recreate` every operations table is dropped first.
    pub async fn ensure_operations_schema(&self, recreate: bool) -> Result<()> {
        use models::*;

        let conn = &self.operations;

        if recreate {
            info!("Recreating operations tables");
            // children before parents
            drop_table(conn, SearchResultEntity).await?;
            drop_table(conn, QueryEntity).await?;
            drop_table(conn, SemanticResultEntity).await?;
            drop_table(conn, SemanticQueryEntity).await?;
            drop_table(conn, RagSummaryEntity).await?;
            drop_table(conn, RagChatEntity).await?;
            drop_table(conn, RagQueryEntity).await?;
        }

        create_table(conn, QueryEntity).await?;
        create_table(conn, SearchResultEntity).await?;
        create_table(conn, SemanticQueryEntity).await?;
        create_table(conn, SemanticResultEntity).await?;
        create_table(conn, RagQueryEntity).await?;
        create_table(conn, RagSummaryEntity).await?;
        create_table(conn, RagChatEntity).await?;

        info!("Operations schema ready");
        Ok(())
    }
}

async fn connect_one(
    label: &str,
    url: &str,
    config: &DatabaseConfig,
) -> Result<DatabaseConnection> {
    info!(database = label, "Connecting to database...");

    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(config.sql_logging);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect to {}: {}", label, e),
        })
}

async fn ping(conn: &DatabaseConnection) -> Result<()> {
    conn.execute_unprepared("SELECT 1")
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Ping failed: {}", e),
        })?;
    Ok(())
}

async fn create_table<E: EntityTrait>(conn: &DatabaseConnection, entity: E) -> Result<()> {
    let table = entity.table_name().to_string();
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();

    conn.execute(backend.build(&stmt)).await?;
    debug!(table = %table, "Table ensured");
    Ok(())
}

async fn drop_table<E: EntityTrait>(conn: &DatabaseConnection, entity: E) -> Result<()> {
    let backend = conn.get_database_backend();
    let stmt = Table::drop().table(entity).if_exists().to_owned();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Execute a `;` separated SQL script statement by statement
pub async fn apply_schema(conn: &DatabaseConnection, sql: &str) -> Result<usize> {
    let statements = split_sql_statements(sql);
    for statement in &statements {
        conn.execute_unprepared(statement).await?;
    }
    info!(statements = statements.len(), "Schema applied");
    Ok(statements.len())
}

/// Load and apply a schema file from disk
pub async fn apply_schema_file(conn: &DatabaseConnection, path: &Path) -> Result<usize> {
    let sql = tokio::fs::read_to_string(path).await?;
    apply_schema(conn, &sql).await
}

/// Split a script into statements, dropping `--` comment lines and blanks
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sql_statements() {
        let sql = "-- header\nCREATE TABLE a (id INT);\n\n  CREATE TABLE b (id INT) ;\n-- trailing\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }

    #[test]
    fn test_bundled_schema_covers_datastore_tables() {
        let statements = split_sql_statements(DATASTORE_SCHEMA);
        assert_eq!(statements.len(), 7);
        for table in [
            "`Document`",
            "`DocumentAbstract`",
            "`DocumentFull`",
            "`DocumentPICO_raw`",
            "`DocumentPICO_enhanced`",
            "`AcademicDatabases`",
            "`DocumentDatabaseMapping`",
        ] {
            assert!(
                statements.iter().any(|s| s.contains(&format!("EXISTS {}", table))),
                "missing {}",
                table
            );
        }
    }

    #[test]
    fn test_health_all_up() {
        let health = DatabaseHealth {
            datastore: true,
            operations: true,
            vectors: false,
        };
        assert!(!health.all_up());
    }
}
