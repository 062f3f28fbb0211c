//! Ingestion CLI error types

use litfunnel_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {path}: {message}")]
    PdfParseError { path: String, message: String },

    #[error("PubMed returned status {status}")]
    PubMedStatus { status: u16 },

    #[error("PubMed XML error: {0}")]
    XmlError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<quick_xml::Error> for IngestionError {
    fn from(e: quick_xml::Error) -> Self {
        IngestionError::XmlError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
