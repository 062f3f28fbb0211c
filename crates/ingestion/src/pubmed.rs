//! PubMed E-utilities efetch client
//!
//! Fetches article XML for a batch of PMIDs and flattens each
//! `PubmedArticle` into the CSV row shape the abstract ingestor reads.

use crate::errors::{IngestionError, Result};
use backoff::ExponentialBackoff;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

/// Year written when an article has no `PubDate/Year`
pub const UNKNOWN_YEAR: &str = "Unknown";

/// One article, column names as in the abstract CSVs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubMedRecord {
    #[serde(rename = "PMID")]
    pub pmid: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Authors", default)]
    pub authors: String,
    #[serde(rename = "Abstract", default)]
    pub abstract_text: String,
    #[serde(rename = "Publication Year", default)]
    pub publication_year: String,
}

pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    max_elapsed: Duration,
}

impl PubMedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(EFETCH_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            max_elapsed: Duration::from_secs(30),
        })
    }

    /// Fetch and parse one efetch batch. A non-200 reply is an error.
    #[instrument(skip(self), fields(count = pmids.len()))]
    pub async fn fetch(&self, pmids: &[String]) -> Result<Vec<PubMedRecord>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let xml = backoff::future::retry_notify(
            policy,
            || async {
                self.request(pmids).await.map_err(|e| match e {
                    IngestionError::PubMedStatus { status } if status < 500 && status != 429 => {
                        backoff::Error::permanent(e)
                    }
                    other => backoff::Error::transient(other),
                })
            },
            |err: IngestionError, wait: Duration| {
                warn!(
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "PubMed request failed, retrying"
                );
            },
        )
        .await?;

        let records = parse_efetch_xml(&xml)?;
        info!(requested = pmids.len(), parsed = records.len(), "PubMed batch fetched");
        Ok(records)
    }

    async fn request(&self, pmids: &[String]) -> Result<String> {
        let params = [
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("rettype", "xml".to_string()),
            ("retmode", "text".to_string()),
        ];

        let response = self.client.get(&self.base_url).query(&params).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(IngestionError::PubMedStatus {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Element whose text is being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Pmid,
    Title,
    Abstract,
    Year,
    ForeName,
    LastName,
}

#[derive(Default)]
struct ArticleState {
    pmid: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    year: Option<String>,
    authors: Vec<String>,
}

impl ArticleState {
    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Pmid => self.pmid = Some(value),
            Field::Title => self.title = Some(value),
            Field::Abstract => self.abstract_text = Some(value),
            Field::Year => self.year = Some(value),
            Field::ForeName | Field::LastName => {}
        }
    }

    fn finish(self) -> Option<PubMedRecord> {
        let pmid = self.pmid?;
        Some(PubMedRecord {
            pmid,
            title: self.title.unwrap_or_default(),
            authors: self.authors.join(", "),
            abstract_text: self.abstract_text.unwrap_or_default(),
            publication_year: self.year.unwrap_or_else(|| UNKNOWN_YEAR.to_string()),
        })
    }
}

/// Parse an efetch `PubmedArticleSet`. Per article the first PMID, title,
/// abstract section and `PubDate/Year` win; authors need both a fore and a
/// last name.
pub fn parse_efetch_xml(xml: &str) -> Result<Vec<PubMedRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut records = Vec::new();
    let mut article: Option<ArticleState> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut in_pub_date = false;
    let mut author: Option<(Option<String>, Option<String>)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match article.as_mut() {
                None => {
                    if e.name().as_ref() == b"PubmedArticle" {
                        article = Some(ArticleState::default());
                    }
                }
                // nested markup inside a collected element, e.g. <i> in a title
                Some(_) if field.is_some() => {}
                Some(state) => {
                    let next = match e.name().as_ref() {
                        b"PMID" if state.pmid.is_none() => Some(Field::Pmid),
                        b"ArticleTitle" if state.title.is_none() => Some(Field::Title),
                        b"AbstractText" if state.abstract_text.is_none() => Some(Field::Abstract),
                        b"Year" if in_pub_date && state.year.is_none() => Some(Field::Year),
                        b"ForeName" if author.is_some() => Some(Field::ForeName),
                        b"LastName" if author.is_some() => Some(Field::LastName),
                        b"PubDate" => {
                            in_pub_date = true;
                            None
                        }
                        b"Author" => {
                            author = Some((None, None));
                            None
                        }
                        _ => None,
                    };
                    if next.is_some() {
                        field = next;
                        text.clear();
                    }
                }
            },
            Ok(Event::Text(ref e)) if field.is_some() => {
                let chunk = e
                    .unescape()
                    .map_err(|err| IngestionError::XmlError(err.to_string()))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(ref e)) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                match field {
                    Some(current) => {
                        if name.as_ref() == field_tag(current) {
                            let value = text.trim().to_string();
                            match current {
                                Field::ForeName | Field::LastName => {
                                    if let Some(a) = author.as_mut() {
                                        if current == Field::ForeName {
                                            a.0 = Some(value);
                                        } else {
                                            a.1 = Some(value);
                                        }
                                    }
                                }
                                _ => {
                                    if let Some(state) = article.as_mut() {
                                        state.set(current, value);
                                    }
                                }
                            }
                            field = None;
                        }
                    }
                    None => match name.as_ref() {
                        b"PubDate" => in_pub_date = false,
                        b"Author" => {
                            if let (Some((Some(fore), Some(last))), Some(state)) =
                                (author.take(), article.as_mut())
                            {
                                state.authors.push(format!("{} {}", fore, last));
                            }
                        }
                        b"PubmedArticle" => {
                            match article.take().and_then(ArticleState::finish) {
                                Some(record) => records.push(record),
                                None => warn!("Skipping PubMed article without a PMID"),
                            }
                            in_pub_date = false;
                            author = None;
                        }
                        _ => {}
                    },
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IngestionError::XmlError(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    debug!(articles = records.len(), "Parsed efetch XML");
    Ok(records)
}

fn field_tag(field: Field) -> &'static [u8] {
    match field {
        Field::Pmid => b"PMID",
        Field::Title => b"ArticleTitle",
        Field::Abstract => b"AbstractText",
        Field::Year => b"Year",
        Field::ForeName => b"ForeName",
        Field::LastName => b"LastName",
    }
}

/// Write records as CSV with the abstract ingestor's header
pub fn write_records<W: Write>(writer: W, records: &[PubMedRecord]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}
