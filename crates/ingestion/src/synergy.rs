//! Synergy dataset connector
//!
//! Turns a Synergy `*_ids.csv` (PMID URLs with inclusion labels) into an
//! abstract CSV enriched from PubMed.

use crate::errors::Result;
use crate::pubmed::{PubMedClient, PubMedRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use tracing::{info, warn};

/// PMIDs per efetch request
pub const BATCH_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(default)]
    pmid: Option<String>,
    #[serde(default)]
    label_included: Option<i64>,
}

/// A labelled PMID after cleaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelledId {
    pub pmid: String,
    pub included: i64,
}

/// PubMed row plus the study it was sampled from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynergyRecord {
    #[serde(rename = "PMID")]
    pub pmid: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Abstract")]
    pub abstract_text: String,
    #[serde(rename = "Publication Year")]
    pub publication_year: String,
    pub study_name: String,
    pub included_in_study: i64,
}

impl SynergyRecord {
    fn new(record: PubMedRecord, study_name: &str, included: i64) -> Self {
        Self {
            pmid: record.pmid,
            title: record.title,
            authors: record.authors,
            abstract_text: record.abstract_text,
            publication_year: record.publication_year,
            study_name: study_name.to_string(),
            included_in_study: included,
        }
    }
}

/// Last `/` segment, so `https://pubmed.ncbi.nlm.nih.gov/123` becomes `123`
pub fn last_segment(pmid: &str) -> &str {
    pmid.rsplit('/').next().unwrap_or(pmid).trim()
}

/// Read the ids file, drop rows without a PMID and keep one row per PMID,
/// included rows first
pub fn read_ids<R: Read>(reader: R) -> Result<Vec<LabelledId>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for row in csv.deserialize::<IdRow>() {
        let row = row?;
        let Some(pmid) = row.pmid.as_deref().map(last_segment).filter(|s| !s.is_empty()) else {
            continue;
        };
        rows.push(LabelledId {
            pmid: pmid.to_string(),
            included: row.label_included.unwrap_or(0),
        });
    }

    Ok(prioritize_included(rows))
}

/// Stable sort by label descending, then keep the first row per PMID
pub fn prioritize_included(mut rows: Vec<LabelledId>) -> Vec<LabelledId> {
    rows.sort_by(|a, b| b.included.cmp(&a.included));

    let mut seen = HashSet::new();
    rows.retain(|row| seen.insert(row.pmid.clone()));
    rows
}

/// Fetch every id from PubMed, `BATCH_SIZE` at a time
pub async fn fetch_study(
    client: &PubMedClient,
    ids: &[LabelledId],
    study_name: &str,
) -> Result<Vec<SynergyRecord>> {
    let labels: HashMap<&str, i64> = ids.iter().map(|r| (r.pmid.as_str(), r.included)).collect();
    let mut records = Vec::with_capacity(ids.len());

    for (batch_no, batch) in ids.chunks(BATCH_SIZE).enumerate() {
        let pmids: Vec<String> = batch.iter().map(|r| r.pmid.clone()).collect();
        let fetched = client.fetch(&pmids).await?;
        info!(batch = batch_no, fetched = fetched.len(), "Synergy batch fetched");

        for record in fetched {
            let included = match labels.get(record.pmid.as_str()) {
                Some(label) => *label,
                None => {
                    warn!(pmid = %record.pmid, "PubMed returned an unrequested PMID");
                    0
                }
            };
            records.push(SynergyRecord::new(record, study_name, included));
        }
    }

    Ok(records)
}

pub fn write_records<W: Write>(writer: W, records: &[SynergyRecord]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("https://pubmed.ncbi.nlm.nih.gov/26067812"), "26067812");
        assert_eq!(last_segment("26067812"), "26067812");
        assert_eq!(last_segment("https://pubmed.ncbi.nlm.nih.gov/"), "");
    }

    #[test]
    fn test_read_ids_prefers_included() {
        let input = "\
pmid,doi,label_included
https://pubmed.ncbi.nlm.nih.gov/111,,0
,10.1000/x,1
https://pubmed.ncbi.nlm.nih.gov/222,,0
https://pubmed.ncbi.nlm.nih.gov/111,,1
https://pubmed.ncbi.nlm.nih.gov/333,,0
";
        let ids = read_ids(input.as_bytes()).unwrap();

        assert_eq!(
            ids,
            vec![
                LabelledId { pmid: "111".into(), included: 1 },
                LabelledId { pmid: "222".into(), included: 0 },
                LabelledId { pmid: "333".into(), included: 0 },
            ]
        );
    }

    #[test]
    fn test_write_adds_study_columns() {
        let record = SynergyRecord::new(
            PubMedRecord {
                pmid: "111".into(),
                title: "Zinc versus penicillamine".into(),
                authors: "Jane Doe".into(),
                abstract_text: "Wilson disease".into(),
                publication_year: "2020".into(),
            },
            "Menon_2022",
            1,
        );

        let mut out = Vec::new();
        write_records(&mut out, &[record]).unwrap();
        let csv = String::from_utf8(out).unwrap();

        assert_eq!(
            csv,
            "PMID,Title,Authors,Abstract,Publication Year,study_name,included_in_study\n\
             111,Zinc versus penicillamine,Jane Doe,Wilson disease,2020,Menon_2022,1\n"
        );
    }
}
