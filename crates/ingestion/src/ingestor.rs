//! Datastore loaders for abstract CSVs and full-text PDFs
//!
//! Both ingestors name the academic database after the directory holding
//! the input file, insert row by row (duplicates are skipped) and map each
//! document to its database.

use crate::errors::{IngestionError, Result};
use crate::pdf;
use crate::pubmed::UNKNOWN_YEAR;
use litfunnel_common::{
    config::PicoConfig,
    db::{DatastoreRepository, InsertReport, NewDocument, PicoRow},
    errors::AppError,
    llm::LlmClient,
    pico::{HttpTokenClassifier, MockTokenClassifier, PicoExtractor, PicoFields, PicoTerms, TokenClassifier},
};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Abstracts sent to the classifier per request
const PICO_BATCH_SIZE: usize = 8;

#[derive(Debug, Deserialize)]
struct AbstractCsvRow {
    #[serde(rename = "PMID")]
    pmid: String,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Authors", default)]
    authors: Option<String>,
    #[serde(rename = "Publication Year", default)]
    year: Option<String>,
    #[serde(rename = "Abstract", default)]
    abstract_text: Option<String>,
}

/// Counts from one CSV load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AbstractIngestReport {
    pub documents: InsertReport,
    pub abstracts: InsertReport,
    pub mappings: InsertReport,
    pub pico: InsertReport,
}

/// Collection name for an input file: its parent directory's name
pub fn database_name_for(path: &Path) -> Result<String> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestionError::InvalidInput(format!(
                "cannot derive a database name from {}",
                path.display()
            ))
        })
}

/// `Unknown` and blanks are NULL. Float renderings such as `2015.0` are
/// accepted.
pub fn parse_year(raw: Option<&str>) -> Option<i32> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty() && *s != UNKNOWN_YEAR)?;

    if let Ok(year) = raw.parse::<i32>() {
        return Some(year);
    }
    match raw.parse::<f64>() {
        Ok(year) if year.fract() == 0.0 && year.abs() < f64::from(i32::MAX) => Some(year as i32),
        _ => {
            warn!(value = raw, "Unparsable publication year, storing NULL");
            None
        }
    }
}

/// Parse an abstract CSV into documents, skipping rows without a PMID
pub fn read_abstract_csv<R: Read>(reader: R) -> Result<Vec<NewDocument>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut documents = Vec::new();

    for row in csv.deserialize::<AbstractCsvRow>() {
        let row = row?;
        let document_id = row.pmid.trim().to_string();
        if document_id.is_empty() {
            warn!("Skipping CSV row without a PMID");
            continue;
        }

        documents.push(NewDocument {
            document_id,
            title: non_empty(row.title),
            authors: non_empty(row.authors),
            year: parse_year(row.year.as_deref()),
            abstract_text: non_empty(row.abstract_text),
        });
    }

    Ok(documents)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Classifier named by `pico.classifier`. The http classifier needs an
/// endpoint; the keyword mock is only used when asked for by name.
pub fn build_pico_extractor(
    config: &PicoConfig,
    llm: Option<Arc<dyn LlmClient>>,
) -> litfunnel_common::Result<PicoExtractor> {
    let classifier: Arc<dyn TokenClassifier> = match config.classifier.as_str() {
        "http" => match HttpTokenClassifier::from_config(config)? {
            Some(http) => Arc::new(http),
            None => {
                return Err(AppError::Configuration {
                    message: "pico.classifier_url is required by the http classifier".to_string(),
                })
            }
        },
        "mock" => {
            warn!("Using keyword mock PICO classifier");
            Arc::new(MockTokenClassifier::default())
        }
        other => {
            return Err(AppError::Configuration {
                message: format!("Unknown PICO classifier '{}'", other),
            })
        }
    };
    let llm = if config.enhance { llm } else { None };
    Ok(PicoExtractor::new(classifier, llm, config.threshold))
}

/// Raw and enhanced PICO rows for a batch of `(document_id, abstract)`
pub async fn extract_pico_rows(
    extractor: &PicoExtractor,
    abstracts: &[(String, String)],
) -> Result<(Vec<PicoRow>, Vec<PicoRow>)> {
    let mut raw = Vec::with_capacity(abstracts.len());
    let mut enhanced = Vec::new();

    for batch in abstracts.chunks(PICO_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let results = extractor.process(&texts).await?;

        for ((document_id, _), (terms, fields)) in batch.iter().zip(results) {
            raw.push(raw_row(document_id, &terms));
            if let Some(fields) = fields.filter(|f| !f.is_empty()) {
                enhanced.push(enhanced_row(document_id, fields));
            }
        }
    }

    Ok((raw, enhanced))
}

fn raw_row(document_id: &str, terms: &PicoTerms) -> PicoRow {
    PicoRow {
        document_id: document_id.to_string(),
        pico_p: PicoTerms::joined(&terms.pico_p),
        pico_i: PicoTerms::joined(&terms.pico_i),
        pico_c: PicoTerms::joined(&terms.pico_c),
        pico_o: PicoTerms::joined(&terms.pico_o),
    }
}

fn enhanced_row(document_id: &str, fields: PicoFields) -> PicoRow {
    PicoRow {
        document_id: document_id.to_string(),
        pico_p: fields.pico_p,
        pico_i: fields.pico_i,
        pico_c: fields.pico_c,
        pico_o: fields.pico_o,
    }
}

/// Map every document to `database_id` unless already mapped
async fn map_documents<'a, I>(
    repo: &DatastoreRepository,
    database_id: &str,
    document_ids: I,
) -> Result<InsertReport>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut mappings = Vec::new();
    for document_id in document_ids {
        if let Some(mapping) = repo.mapping_if_not_exists(database_id, document_id).await? {
            mappings.push(mapping);
        }
    }

    if mappings.is_empty() {
        return Ok(InsertReport::default());
    }
    Ok(repo.insert_mappings(mappings).await?)
}

pub struct AbstractIngestor {
    repo: DatastoreRepository,
    extractor: Option<PicoExtractor>,
}

impl AbstractIngestor {
    /// `extractor` of `None` skips the PICO pass
    pub fn new(repo: DatastoreRepository, extractor: Option<PicoExtractor>) -> Self {
        Self { repo, extractor }
    }

    #[instrument(skip(self, description), fields(csv = %csv_path.display()))]
    pub async fn process_csv(
        &self,
        csv_path: &Path,
        description: Option<&str>,
    ) -> Result<AbstractIngestReport> {
        let database_name = database_name_for(csv_path)?;
        let database_id = self
            .repo
            .ensure_database_exists(&database_name, description)
            .await?;

        let file = std::fs::File::open(csv_path)?;
        let documents = read_abstract_csv(file)?;
        info!(rows = documents.len(), database = %database_name, "CSV parsed");

        let mut report = AbstractIngestReport {
            documents: self.repo.insert_documents(&documents).await?,
            abstracts: self.repo.insert_abstracts(&documents).await?,
            ..Default::default()
        };

        report.mappings = map_documents(
            &self.repo,
            &database_id,
            documents.iter().map(|d| d.document_id.as_str()),
        )
        .await?;

        if self.extractor.is_some() {
            report.pico = self.process_pico().await?;
        }

        info!(?report, "Abstract ingestion complete");
        Ok(report)
    }

    /// Extract PICO for every abstract that has none yet
    #[instrument(skip(self))]
    pub async fn process_pico(&self) -> Result<InsertReport> {
        let Some(extractor) = &self.extractor else {
            return Ok(InsertReport::default());
        };

        let pending = self.repo.fetch_unprocessed_pico().await?;
        if pending.is_empty() {
            info!("No abstracts awaiting PICO extraction");
            return Ok(InsertReport::default());
        }

        info!(count = pending.len(), "Extracting PICO terms");
        let (raw, enhanced) = extract_pico_rows(extractor, &pending).await?;
        let report = self.repo.insert_pico(&raw, &enhanced).await?;

        info!(
            raw = raw.len(),
            enhanced = enhanced.len(),
            inserted = report.inserted,
            "PICO rows stored"
        );
        Ok(report)
    }
}

pub struct FullDocumentIngestor {
    repo: DatastoreRepository,
}

impl FullDocumentIngestor {
    pub fn new(repo: DatastoreRepository) -> Self {
        Self { repo }
    }

    /// Store a PDF and its extracted text. A PDF without extractable text is
    /// still stored, with a NULL full text.
    #[instrument(skip(self), fields(pdf = %pdf_path.display()))]
    pub async fn process_blob(&self, pdf_path: &Path, document_id: &str) -> Result<InsertReport> {
        let database_name = database_name_for(pdf_path)?;
        let database_id = self.repo.ensure_database_exists(&database_name, None).await?;

        let blob = tokio::fs::read(pdf_path).await?;
        let text = match pdf::extract_text_from_bytes(&blob, &pdf_path.display().to_string()) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Storing PDF without extracted text");
                None
            }
        };

        let mut report = self
            .repo
            .insert_full_document(document_id, blob, text)
            .await?;
        report.merge(map_documents(&self.repo, &database_id, [document_id]).await?);

        info!(document_id, database = %database_name, "Full document stored");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litfunnel_common::llm::MockLlm;

    fn mock_classifier() -> PicoConfig {
        PicoConfig {
            classifier: "mock".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_database_name_from_parent_dir() {
        let name = database_name_for(Path::new("datalake/synergy/processed_pubmed.csv")).unwrap();
        assert_eq!(name, "synergy");
        assert!(database_name_for(Path::new("abstracts.csv")).is_err());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(Some("2015")), Some(2015));
        assert_eq!(parse_year(Some("2015.0")), Some(2015));
        assert_eq!(parse_year(Some("Unknown")), None);
        assert_eq!(parse_year(Some(" ")), None);
        assert_eq!(parse_year(Some("Spring 2018")), None);
        assert_eq!(parse_year(None), None);
    }

    #[test]
    fn test_read_abstract_csv() {
        let input = "\
PMID,Title,Authors,Abstract,Publication Year,study_name
16625675,Aspirin trial,\"John Smith, Jane Doe\",Adults took aspirin.,2006,Menon_2022
,Missing id,,,2001,Menon_2022
30049245,No abstract,,,Unknown,Menon_2022
";
        let docs = read_abstract_csv(input.as_bytes()).unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].document_id, "16625675");
        assert_eq!(docs[0].authors.as_deref(), Some("John Smith, Jane Doe"));
        assert_eq!(docs[0].year, Some(2006));

        assert_eq!(docs[1].year, None);
        assert_eq!(docs[1].abstract_text, None);
    }

    #[tokio::test]
    async fn test_extract_pico_rows() {
        let llm = MockLlm::with_response(
            "{'pico_p': 'Adults', 'pico_i': 'Aspirin', 'pico_o': 'Mortality', 'pico_c': 'Placebo'}",
        );
        let config = mock_classifier();
        let extractor = build_pico_extractor(&config, Some(Arc::new(llm))).unwrap();

        let abstracts = vec![(
            "16625675".to_string(),
            "Aspirin lowered mortality in adults compared with placebo.".to_string(),
        )];
        let (raw, enhanced) = extract_pico_rows(&extractor, &abstracts).await.unwrap();

        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].document_id, "16625675");
        assert_eq!(raw[0].pico_i.as_deref(), Some("Aspirin; placebo."));
        assert_eq!(raw[0].pico_c, None);

        assert_eq!(enhanced.len(), 1);
        assert_eq!(enhanced[0].pico_c.as_deref(), Some("Placebo"));
    }

    #[tokio::test]
    async fn test_enhancement_disabled_in_config() {
        let config = PicoConfig {
            enhance: false,
            ..mock_classifier()
        };
        let extractor = build_pico_extractor(&config, Some(Arc::new(MockLlm::new()))).unwrap();

        let abstracts = vec![("1".to_string(), "Exercise improved recovery.".to_string())];
        let (raw, enhanced) = extract_pico_rows(&extractor, &abstracts).await.unwrap();

        assert_eq!(raw[0].pico_o.as_deref(), Some("recovery."));
        assert!(enhanced.is_empty());
    }

    #[test]
    fn test_http_classifier_requires_url() {
        assert!(matches!(
            build_pico_extractor(&PicoConfig::default(), None),
            Err(AppError::Configuration { .. })
        ));

        let config = PicoConfig {
            classifier_url: Some("http://localhost:8080/classify".into()),
            ..Default::default()
        };
        assert!(build_pico_extractor(&config, None).is_ok());
    }

    #[test]
    fn test_unknown_classifier_rejected() {
        let config = PicoConfig {
            classifier: "keywords".into(),
            ..Default::default()
        };
        assert!(matches!(
            build_pico_extractor(&config, None),
            Err(AppError::Configuration { .. })
        ));
    }
}
