//! LitFunnel Ingestion CLI
//!
//! Loads literature into the datastore and builds the vector indexes:
//! 1. Abstract CSVs and PDFs into the document tables
//! 2. PICO extraction over unprocessed abstracts
//! 3. PubMed and Synergy exports to abstract CSVs
//! 4. Abstract, PICO and fulltext vector indexes

mod chunker;
mod errors;
mod index_builder;
mod ingestor;
mod pdf;
mod pubmed;
mod synergy;

use anyhow::Context;
use clap::{Parser, Subcommand};
use litfunnel_common::{
    config::AppConfig,
    db::{apply_schema_file, Databases, DatastoreRepository},
    embeddings::create_embedder,
    llm::create_llm,
    VERSION,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chunker::ChunkingConfig;
use index_builder::IndexBuilder;
use ingestor::{build_pico_extractor, AbstractIngestor, FullDocumentIngestor};
use pubmed::PubMedClient;

const PUBMED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Load literature into the LitFunnel datastore and vector indexes")]
#[command(version)]
struct Cli {
    /// Configuration file; `config/` and `APP__` variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the datastore tables and ensure the operations tables
    InitSchema {
        /// SQL script to apply instead of the bundled datastore schema
        #[arg(long)]
        schema_file: Option<PathBuf>,
        /// Drop and recreate the operations tables
        #[arg(long)]
        recreate: bool,
    },

    /// Load an abstract CSV; the parent directory names the database
    Abstracts {
        csv: PathBuf,
        /// Description for a newly created database
        #[arg(long)]
        description: Option<String>,
        /// Do not run PICO extraction afterwards
        #[arg(long)]
        skip_pico: bool,
        /// Extract raw PICO terms only
        #[arg(long)]
        no_enhance: bool,
    },

    /// Store a PDF and its extracted text for a document
    Pdf { pdf: PathBuf, document_id: String },

    /// Extract PICO for abstracts that have none yet
    Pico {
        #[arg(long)]
        no_enhance: bool,
    },

    /// Fetch PubMed articles and write them as an abstract CSV
    Pubmed {
        #[arg(required = true)]
        pmids: Vec<String>,
        /// Output CSV (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Enrich a Synergy ids CSV from PubMed
    Synergy {
        ids_csv: PathBuf,
        #[arg(long)]
        study_name: String,
        /// Defaults to `processed_{study_name}_pubmed.csv` next to the input
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build the abstract index
    BuildIndex {
        /// Defaults to the configured base table
        #[arg(long)]
        table: Option<String>,
    },

    /// Build `{base}_{key}` for all 15 PICO combinations
    BuildPicoIndexes {
        #[arg(long)]
        base: Option<String>,
    },

    /// Chunk stored full texts into `{base}_fulltext`
    BuildFulltextIndex {
        #[arg(long)]
        base: Option<String>,
        #[arg(long, default_value_t = ChunkingConfig::default().chunk_size)]
        chunk_size: usize,
    },

    /// Delete nodes whose metadata lacks any required key
    PruneIndex {
        #[arg(long)]
        table: String,
        #[arg(long, required = true, num_args = 1..)]
        required: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config);
    info!("Starting LitFunnel ingestion v{}", VERSION);

    run(cli.command, &config).await
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    // stdout may carry CSV output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::InitSchema {
            schema_file,
            recreate,
        } => {
            let dbs = Databases::connect(config).await?;
            let statements = match schema_file {
                Some(path) => apply_schema_file(&dbs.datastore, &path)
                    .await
                    .with_context(|| format!("Failed to apply {}", path.display()))?,
                None => dbs.ensure_datastore_schema().await?,
            };
            dbs.ensure_operations_schema(recreate).await?;
            info!(statements, recreate, "Schema initialised");
        }

        Commands::Abstracts {
            csv,
            description,
            skip_pico,
            no_enhance,
        } => {
            let repo = datastore(config).await?;
            let extractor = if skip_pico {
                None
            } else {
                Some(pico_extractor(config, no_enhance)?)
            };

            let report = AbstractIngestor::new(repo, extractor)
                .process_csv(&csv, description.as_deref())
                .await?;
            info!(
                documents = report.documents.inserted,
                duplicates = report.documents.duplicates,
                mappings = report.mappings.inserted,
                pico = report.pico.inserted,
                "Abstracts loaded"
            );
        }

        Commands::Pdf { pdf, document_id } => {
            let repo = datastore(config).await?;
            let report = FullDocumentIngestor::new(repo)
                .process_blob(&pdf, &document_id)
                .await?;
            info!(inserted = report.inserted, duplicates = report.duplicates, "PDF loaded");
        }

        Commands::Pico { no_enhance } => {
            let repo = datastore(config).await?;
            let extractor = pico_extractor(config, no_enhance)?;
            let report = AbstractIngestor::new(repo, Some(extractor))
                .process_pico()
                .await?;
            info!(inserted = report.inserted, "PICO extraction complete");
        }

        Commands::Pubmed { pmids, out } => {
            let client = PubMedClient::new(PUBMED_TIMEOUT)?;
            let records = client.fetch(&pmids).await?;
            match out {
                Some(path) => {
                    pubmed::write_records(File::create(&path)?, &records)?;
                    info!(records = records.len(), out = %path.display(), "PubMed CSV written");
                }
                None => pubmed::write_records(std::io::stdout().lock(), &records)?,
            }
        }

        Commands::Synergy {
            ids_csv,
            study_name,
            out,
        } => {
            let ids = synergy::read_ids(File::open(&ids_csv)?)?;
            info!(ids = ids.len(), study = %study_name, "Synergy ids cleaned");

            let client = PubMedClient::new(PUBMED_TIMEOUT)?;
            let records = synergy::fetch_study(&client, &ids, &study_name).await?;

            let out = out.unwrap_or_else(|| default_synergy_output(&ids_csv, &study_name));
            synergy::write_records(File::create(&out)?, &records)?;
            info!(records = records.len(), out = %out.display(), "Synergy CSV written");
        }

        Commands::BuildIndex { table } => {
            let (dbs, builder) = index_builder(config).await?;
            let records = DatastoreRepository::new(dbs.datastore.clone())
                .load_abstract_records()
                .await?;
            let table = table.unwrap_or_else(|| config.vector.base_table.clone());
            builder.build_abstract_index(&records, &table).await?;
        }

        Commands::BuildPicoIndexes { base } => {
            let (dbs, builder) = index_builder(config).await?;
            let records = DatastoreRepository::new(dbs.datastore.clone())
                .load_abstract_records()
                .await?;
            let base = base.unwrap_or_else(|| config.vector.base_table.clone());
            let written = builder.build_pico_indexes(&records, &base).await?;
            for (key, count) in &written {
                info!(key = %key, count, "PICO index");
            }
        }

        Commands::BuildFulltextIndex { base, chunk_size } => {
            let (dbs, builder) = index_builder(config).await?;
            let texts = DatastoreRepository::new(dbs.datastore.clone())
                .load_full_texts()
                .await?;
            let table = match base {
                Some(base) => format!("{}_fulltext", base),
                None => config.fulltext_table(),
            };
            let chunking = ChunkingConfig {
                chunk_size,
                ..Default::default()
            };
            builder.build_fulltext_index(&texts, &table, &chunking).await?;
        }

        Commands::PruneIndex { table, required } => {
            let (_, builder) = index_builder(config).await?;
            let deleted = builder.prune(&table, &required).await?;
            info!(table = %table, deleted, "Index pruned");
        }
    }

    Ok(())
}

async fn datastore(config: &AppConfig) -> anyhow::Result<DatastoreRepository> {
    let dbs = Databases::connect(config).await?;
    Ok(DatastoreRepository::new(dbs.datastore))
}

fn pico_extractor(
    config: &AppConfig,
    no_enhance: bool,
) -> anyhow::Result<litfunnel_common::pico::PicoExtractor> {
    let llm = if no_enhance {
        None
    } else {
        Some(create_llm(&config.pico.enhancement_llm(&config.llm))?)
    };
    Ok(build_pico_extractor(&config.pico, llm)?)
}

async fn index_builder(config: &AppConfig) -> anyhow::Result<(Databases, IndexBuilder)> {
    let dbs = Databases::connect(config).await?;
    let embedder = create_embedder(&config.embedding, config.vector.dimension)?;
    let builder = IndexBuilder::new(
        dbs.vectors.clone(),
        embedder,
        config.embedding.batch_size,
        config.vector.default_top_k,
    );
    Ok((dbs, builder))
}

fn default_synergy_output(ids_csv: &Path, study_name: &str) -> PathBuf {
    let file = format!("processed_{}_pubmed.csv", study_name);
    match ids_csv.parent() {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}
